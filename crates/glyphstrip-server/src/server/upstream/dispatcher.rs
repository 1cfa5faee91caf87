//! Per-character dispatch.
//!
//! [`Dispatcher::dispatch`] runs one character through classify → locate →
//! probe → render and always returns a [`DispatchResult`]. Any failure along
//! the way is turned into a fallback image plus an error detail, so callers
//! never see an `Err`.

use super::{
    endpoint, health::HealthProber, locator::ServiceLocator, status_error, transport_error,
};
use core::time::Duration;
use glyphstrip_core::{
    CharacterRequest, DispatchResult, Error, ImageData, Result, fallback,
};
use reqwest::{
    Client, Url,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Path the rendering services accept work on.
pub const GENERATE_PATH: &str = "/generate";

/// Format assumed when a rendering service does not declare an image type.
const DEFAULT_RENDER_FORMAT: &str = "png";

#[derive(Clone, Debug)]
pub struct Dispatcher {
    client: Client,
    locator: Arc<ServiceLocator>,
    prober: HealthProber,
    render_timeout: Duration,
}

impl Dispatcher {
    pub const fn new(
        client: Client,
        locator: Arc<ServiceLocator>,
        prober: HealthProber,
        render_timeout: Duration,
    ) -> Self {
        Self {
            client,
            locator,
            prober,
            render_timeout,
        }
    }

    /// Renders one character, substituting a fallback image on any failure.
    ///
    /// The elapsed time covers the whole sequence, whatever the outcome.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(position = request.position(), category = %request.category())
    )]
    pub async fn dispatch(&self, request: CharacterRequest) -> DispatchResult {
        let start = Instant::now();
        match self.try_dispatch(&request).await {
            Ok(image) => {
                tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "rendered");
                DispatchResult::rendered(&request, image, start.elapsed())
            }
            Err(e) => {
                tracing::warn!(
                    character = %request.character(),
                    error = %e,
                    "substituting fallback image"
                );
                DispatchResult::fallback(
                    &request,
                    fallback::character_image(request.character()),
                    e.to_string(),
                    start.elapsed(),
                )
            }
        }
    }

    async fn try_dispatch(&self, request: &CharacterRequest) -> Result<ImageData> {
        let base = self.locator.resolve(request.category())?;
        if !self.prober.probe(base).await {
            return Err(Error::HealthCheckFailed);
        }
        self.render(base, request).await
    }

    async fn render(&self, base: &Url, request: &CharacterRequest) -> Result<ImageData> {
        let response = self
            .client
            .post(endpoint(base, GENERATE_PATH))
            .header(ACCEPT, "image/png")
            .json(&render_payload(request))
            .timeout(self.render_timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.render_timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(image_subtype)
            .unwrap_or(DEFAULT_RENDER_FORMAT)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.render_timeout))?;
        if bytes.is_empty() {
            return Err(Error::InvalidImageData {
                reason: "rendering service returned an empty body".to_string(),
            });
        }

        Ok(ImageData::from_bytes(&format, &bytes))
    }
}

/// Builds `{ <letter|number|character>: "<c>", style }`.
fn render_payload(request: &CharacterRequest) -> Value {
    let mut body = Map::with_capacity(2);
    body.insert(
        request.category().payload_field().to_string(),
        Value::String(request.character().to_string()),
    );
    body.insert("style".to_string(), Value::String(request.style().to_string()));
    Value::Object(body)
}

/// Extracts `png` from `image/png; charset=binary`.
fn image_subtype(content_type: &str) -> Option<&str> {
    let mime = content_type.split(';').next()?.trim();
    let subtype = mime.strip_prefix("image/")?;
    (!subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
    .then_some(subtype)
}
