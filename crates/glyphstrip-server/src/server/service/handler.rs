//! Request handling for `POST /generate` and `GET /health`.
//!
//! This module defines [`GlyphService`], the state shared by every request,
//! and the handlers that drive one text through the pipeline:
//!
//! - Validate the body and split the text into per-character requests.
//! - Fan the characters out to the rendering services via [`aggregate`].
//! - Hand the ordered images to the compositor (or the local fallback).
//! - Summarise timings into [`RequestMetrics`] and reply with the strip.
//!
//! Collaborator failures never fail a request: they surface as fallback
//! images and `success: false` entries in the metrics.

use crate::server::{
    config::ServerConfig,
    fanout::aggregator::aggregate,
    telemetry::{
        increment_characters_dispatched, increment_compositor_fallbacks,
        increment_dispatch_fallbacks, increment_requests, record_request_duration,
    },
    upstream::{
        compositor::CompositorClient, dispatcher::Dispatcher, health::HealthProber,
        locator::ServiceLocator,
    },
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use glyphstrip_core::{
    CharacterRequest, CompositorOptions, Error, ImageData, RequestMetrics, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub text: Option<String>,
    pub style: Option<String>,
    pub compositor_options: Option<CompositorOptions>,
}

/// Reply to `POST /generate`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: ImageData,
    pub metrics: RequestMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// State shared by all requests.
///
/// Cheap to clone: the HTTP client pools connections internally and the
/// locator is behind an `Arc`.
#[derive(Clone, Debug)]
pub struct GlyphService {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    compositor: CompositorClient,
}

impl GlyphService {
    /// Resolves the collaborator addresses and builds the shared clients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a collaborator address cannot be
    /// resolved, or [`Error::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let locator = Arc::new(ServiceLocator::new(&config.endpoints)?);
        let client = Client::builder()
            .user_agent(concat!("glyphstrip/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport {
                context: format!("failed to build HTTP client: {e}"),
            })?;

        let prober = HealthProber::new(client.clone(), config.health_timeout);
        let dispatcher = Dispatcher::new(
            client.clone(),
            Arc::clone(&locator),
            prober.clone(),
            config.render_timeout,
        );
        let compositor = CompositorClient::new(
            client,
            locator.compositor().clone(),
            prober,
            config.composite_timeout,
        );

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            compositor,
        })
    }

    /// Runs one validated text through dispatch, fan-in and compositing.
    pub async fn generate(
        &self,
        text: &str,
        style: &str,
        options: &CompositorOptions,
    ) -> Result<GenerateResponse> {
        let start = Instant::now();

        let requests = CharacterRequest::from_text(text, style);
        let results = aggregate(requests, |request| self.dispatcher.dispatch(request)).await?;
        let composite = self.compositor.composite(&results, options).await;

        let metrics = RequestMetrics::collect(&results, &composite, start.elapsed());

        increment_characters_dispatched(results.len() as u64);
        increment_dispatch_fallbacks(metrics.fallback_count() as u64);
        if !composite.success() {
            increment_compositor_fallbacks();
        }
        record_request_duration(start.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            characters = metrics.characters_processed,
            overall_success = metrics.overall_success,
            total_ms = metrics.total_elapsed_ms,
            "generated image"
        );

        Ok(GenerateResponse {
            image_url: composite.image,
            metrics,
        })
    }

    /// Checks a request body against the configured limits and fills in
    /// defaults. Returns the text, style and complete compositor options.
    fn validate(&self, body: GenerateRequest) -> Result<(String, String, CompositorOptions)> {
        let text = body.text.unwrap_or_default();
        if text.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "Text is required".to_string(),
            });
        }
        let len = text.chars().count();
        if len > self.config.max_text_chars {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Text is too long: {len} characters (max {})",
                    self.config.max_text_chars
                ),
            });
        }

        let style = body
            .style
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_style.clone());

        let options = body.compositor_options.unwrap_or_default();
        options.validate()?;

        Ok((text, style, options))
    }
}

/// Builds the application router: `/generate` (plus its `/api` alias) and
/// `/health`, with CORS, a body limit and request tracing.
pub fn router(service: GlyphService) -> Router {
    let body_limit = service.config.max_body_bytes;
    Router::new()
        .route("/generate", post(generate))
        .route("/api/generate", post(generate))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn generate(
    State(service): State<GlyphService>,
    body: core::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    increment_requests();

    let Json(body) = body.map_err(rejection_error)?;
    let (text, style, options) = service.validate(body)?;

    service
        .generate(&text, &style, &options)
        .await
        .map(Json)
        .inspect_err(|e| tracing::error!(error = %e, "generate failed"))
}

/// Oversized bodies keep their 413; every other rejection is a bad request.
fn rejection_error(rejection: JsonRejection) -> Error {
    let reason = rejection.body_text();
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { reason }
    } else {
        Error::InvalidRequest { reason }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        config::ServiceEndpoints,
        testing::{MockService, composited, rendered_bytes},
    };
    use core::time::Duration;
    use glyphstrip_core::{ServiceTiming, fallback};
    use reqwest::Url;
    use serde_json::{Value, json};
    use tokio::{net::TcpListener, task::JoinHandle};

    struct TestApp {
        url: Url,
        handle: JoinHandle<()>,
    }

    impl TestApp {
        async fn start(config: ServerConfig) -> Self {
            let app = router(GlyphService::new(config).unwrap());
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self {
                url: Url::parse(&format!("http://{addr}")).unwrap(),
                handle,
            }
        }

        async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
            let response = Client::new()
                .post(self.url.join(path).unwrap())
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = response.status();
            (status, response.json().await.unwrap())
        }
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    fn config_for(
        letter: &MockService,
        digit: &MockService,
        special: &MockService,
        compositor: &MockService,
    ) -> ServerConfig {
        ServerConfig {
            endpoints: ServiceEndpoints {
                letter: Some(letter.url().clone()),
                digit: Some(digit.url().clone()),
                special: Some(special.url().clone()),
                compositor: Some(compositor.url().clone()),
            },
            health_timeout: Duration::from_millis(500),
            render_timeout: Duration::from_millis(1_000),
            composite_timeout: Duration::from_millis(1_000),
            ..ServerConfig::default()
        }
    }

    fn single(service: &MockService) -> ServerConfig {
        config_for(service, service, service, service)
    }

    fn parse(body: Value) -> GenerateResponse {
        serde_json::from_value(body).unwrap()
    }

    fn names(breakdown: &[ServiceTiming]) -> Vec<&str> {
        breakdown.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn all_healthy_mixed_text() {
        let letters = MockService::start().await;
        let digits = MockService::start().await;
        let specials = MockService::start().await;
        let compositor = MockService::start().await;
        let app = TestApp::start(config_for(&letters, &digits, &specials, &compositor)).await;

        let (status, body) = app.post("/generate", json!({ "text": "A1!" })).await;
        assert_eq!(status, StatusCode::OK);
        let response = parse(body);

        let metrics = &response.metrics;
        assert!(metrics.overall_success);
        assert_eq!(metrics.characters_processed, 3);
        assert_eq!(metrics.services_used, 4);
        assert_eq!(
            names(&metrics.service_breakdown),
            ["letter-A", "digit-1", "special-!", "image-compositor"]
        );

        assert_eq!(letters.generate_bodies(), vec![json!({ "letter": "A", "style": "default" })]);
        assert_eq!(digits.generate_bodies(), vec![json!({ "number": "1", "style": "default" })]);
        assert_eq!(
            specials.generate_bodies(),
            vec![json!({ "character": "!", "style": "default" })]
        );

        let images: Vec<String> = ["A", "1", "!"]
            .iter()
            .map(|c| ImageData::from_bytes("png", &rendered_bytes(c)).to_string())
            .collect();
        let refs: Vec<&str> = images.iter().map(String::as_str).collect();
        assert_eq!(response.image_url, composited(&refs));
    }

    #[tokio::test]
    async fn unhealthy_letter_service_falls_back() {
        let letters = MockService::start().await;
        letters.set_healthy(false);
        let others = MockService::start().await;
        let app = TestApp::start(config_for(&letters, &others, &others, &others)).await;

        let (status, body) = app.post("/generate", json!({ "text": "B" })).await;
        assert_eq!(status, StatusCode::OK);
        let metrics = parse(body).metrics;

        assert!(!metrics.overall_success);
        assert_eq!(metrics.characters_processed, 1);
        let entry = &metrics.service_breakdown[0];
        assert_eq!(entry.name, "letter-B");
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("health check failed"));
        assert_eq!(letters.generate_hits(), 0);

        // The fallback cell is still composited.
        let compositor_input = others.composite_bodies();
        assert_eq!(
            compositor_input[0]["images"],
            json!([fallback::character_image('B').to_string()])
        );
    }

    #[tokio::test]
    async fn compositor_down_uses_local_composite() {
        let renderers = MockService::start().await;
        let compositor = MockService::start().await;
        compositor.set_healthy(false);
        let app = TestApp::start(config_for(&renderers, &renderers, &renderers, &compositor)).await;

        let (status, body) = app.post("/generate", json!({ "text": "Hi" })).await;
        assert_eq!(status, StatusCode::OK);
        let response = parse(body);

        assert_eq!(response.image_url.format(), "svg+xml");
        let metrics = &response.metrics;
        assert!(!metrics.overall_success);
        let last = metrics.service_breakdown.last().unwrap();
        assert_eq!(last.name, "image-compositor");
        assert!(!last.success);
        assert!(
            metrics.service_breakdown[..2].iter().all(|s| s.success),
            "{metrics:?}"
        );
    }

    #[tokio::test]
    async fn preserves_order_when_later_characters_finish_first() {
        let service = MockService::start().await;
        service.delay_char('a', Duration::from_millis(200));
        service.delay_char('b', Duration::from_millis(100));
        let app = TestApp::start(single(&service)).await;

        let (_, body) = app.post("/generate", json!({ "text": "abc" })).await;
        let response = parse(body);
        assert_eq!(
            names(&response.metrics.service_breakdown),
            ["letter-A", "letter-B", "letter-C", "image-compositor"]
        );

        let images: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|c| ImageData::from_bytes("png", &rendered_bytes(c)).to_string())
            .collect();
        assert_eq!(service.composite_bodies()[0]["images"], json!(images));
    }

    #[tokio::test]
    async fn repeated_requests_have_the_same_shape() {
        let service = MockService::start().await;
        let app = TestApp::start(single(&service)).await;

        let body = json!({ "text": "Ab3", "style": "bold" });
        let first = parse(app.post("/generate", body.clone()).await.1);
        let second = parse(app.post("/generate", body).await.1);

        assert_eq!(first.image_url, second.image_url);
        assert_eq!(
            names(&first.metrics.service_breakdown),
            names(&second.metrics.service_breakdown)
        );
        assert_eq!(first.metrics.overall_success, second.metrics.overall_success);
        assert!(
            service
                .generate_bodies()
                .iter()
                .all(|b| b["style"] == "bold")
        );
    }

    #[tokio::test]
    async fn api_alias_and_compositor_options() {
        let service = MockService::start().await;
        let app = TestApp::start(single(&service)).await;

        let (status, _) = app
            .post(
                "/api/generate",
                json!({ "text": "x", "compositorOptions": { "spacing": 0, "format": "jpeg" } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            service.composite_bodies()[0]["options"],
            json!({
                "spacing": 0,
                "backgroundColor": "#ffffff",
                "maxHeight": 200,
                "padding": 20,
                "format": "jpeg"
            })
        );
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let service = MockService::start().await;
        let app = TestApp::start(ServerConfig {
            max_text_chars: 4,
            ..single(&service)
        })
        .await;

        let cases = [
            (json!({}), "Text is required"),
            (json!({ "text": "" }), "Text is required"),
            (json!({ "text": "hello" }), "Text is too long"),
            (
                json!({ "text": "hi", "compositorOptions": { "maxHeight": 0 } }),
                "maxHeight",
            ),
        ];
        for (body, expected) in cases {
            let (status, reply) = app.post("/generate", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            let error = reply["error"].as_str().unwrap();
            assert!(error.contains(expected), "{body}: {error}");
        }

        let response = Client::new()
            .post(app.url.join("/generate").unwrap())
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let reply: Value = response.json().await.unwrap();
        assert!(reply["error"].is_string());

        assert_eq!(service.generate_hits(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_with_413() {
        let service = MockService::start().await;
        let app = TestApp::start(ServerConfig {
            max_body_bytes: 64,
            ..single(&service)
        })
        .await;

        let (status, reply) = app
            .post("/generate", json!({ "text": "a".repeat(200) }))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(reply["error"].as_str().unwrap().contains("length limit"));
        assert_eq!(service.generate_hits(), 0);
    }

    #[tokio::test]
    async fn health_reports_version_and_timestamp() {
        let service = MockService::start().await;
        let app = TestApp::start(single(&service)).await;

        let response = Client::new()
            .get(app.url.join("/health").unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = response.json().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
    }
}
