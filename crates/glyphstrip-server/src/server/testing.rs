//! In-process stand-ins for the collaborating services.
//!
//! [`MockService`] serves the rendering contract (`GET /health`,
//! `POST /generate`) and the compositor contract (`POST /composite`) on an
//! ephemeral local port, with knobs for health, delays and failures, and
//! records what it received.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use core::time::Duration;
use glyphstrip_core::ImageData;
use reqwest::Url;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{net::TcpListener, task::JoinHandle};

/// Prefix of every image the mock renders.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Bytes the mock returns for `character`: the PNG magic plus the character,
/// so tests can tell images apart.
pub fn rendered_bytes(character: &str) -> Vec<u8> {
    let mut bytes = PNG_BYTES.to_vec();
    bytes.extend_from_slice(character.as_bytes());
    bytes
}

/// What the mock compositor answers for `images`: their strings joined with
/// `|`, wrapped as a PNG image-data string.
pub fn composited(images: &[&str]) -> ImageData {
    ImageData::from_bytes("png", images.join("|").as_bytes())
}

struct MockState {
    healthy: AtomicBool,
    health_delay: Mutex<Duration>,
    health_hits: AtomicUsize,
    generate_delay: Mutex<Duration>,
    delay_by_char: Mutex<HashMap<String, Duration>>,
    generate_failure: Mutex<Option<(u16, String)>>,
    generate_hits: AtomicUsize,
    generate_bodies: Mutex<Vec<Value>>,
    composite_delay: Mutex<Duration>,
    composite_failure: Mutex<Option<(u16, String)>>,
    composite_override: Mutex<Option<Value>>,
    composite_bodies: Mutex<Vec<Value>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            health_delay: Mutex::new(Duration::ZERO),
            health_hits: AtomicUsize::new(0),
            generate_delay: Mutex::new(Duration::ZERO),
            delay_by_char: Mutex::new(HashMap::new()),
            generate_failure: Mutex::new(None),
            generate_hits: AtomicUsize::new(0),
            generate_bodies: Mutex::new(Vec::new()),
            composite_delay: Mutex::new(Duration::ZERO),
            composite_failure: Mutex::new(None),
            composite_override: Mutex::new(None),
            composite_bodies: Mutex::new(Vec::new()),
        }
    }
}

fn error_response(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health(State(state): State<Arc<MockState>>) -> Response {
    state.health_hits.fetch_add(1, Ordering::SeqCst);
    let delay = *state.health_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if state.healthy.load(Ordering::SeqCst) {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
            .into_response()
    }
}

async fn generate(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.generate_hits.fetch_add(1, Ordering::SeqCst);
    state.generate_bodies.lock().unwrap().push(body.clone());

    let character = ["letter", "number", "character"]
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let delay = state
        .delay_by_char
        .lock()
        .unwrap()
        .get(&character)
        .copied()
        .unwrap_or_else(|| *state.generate_delay.lock().unwrap());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if let Some((status, message)) = state.generate_failure.lock().unwrap().clone() {
        return error_response(status, &message);
    }

    ([(CONTENT_TYPE, "image/png")], rendered_bytes(&character)).into_response()
}

async fn composite(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.composite_bodies.lock().unwrap().push(body.clone());

    let delay = *state.composite_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if let Some((status, message)) = state.composite_failure.lock().unwrap().clone() {
        return error_response(status, &message);
    }
    if let Some(reply) = state.composite_override.lock().unwrap().clone() {
        return Json(reply).into_response();
    }

    let images: Vec<&str> = body["images"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    Json(json!({ "compositeImage": composited(&images) })).into_response()
}

/// A local collaborator serving both the rendering and compositor contracts.
pub struct MockService {
    state: Arc<MockState>,
    url: Url,
    handle: JoinHandle<()>,
}

impl MockService {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());
        let app = Router::new()
            .route("/health", get(health))
            .route("/generate", post(generate))
            .route("/composite", post(composite))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            handle,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_health_delay(&self, delay: Duration) {
        *self.state.health_delay.lock().unwrap() = delay;
    }

    pub fn set_generate_delay(&self, delay: Duration) {
        *self.state.generate_delay.lock().unwrap() = delay;
    }

    /// Delays `/generate` for one specific character value.
    pub fn delay_char(&self, character: char, delay: Duration) {
        self.state
            .delay_by_char
            .lock()
            .unwrap()
            .insert(character.to_string(), delay);
    }

    pub fn fail_generate_with(&self, status: u16, message: &str) {
        *self.state.generate_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn set_composite_delay(&self, delay: Duration) {
        *self.state.composite_delay.lock().unwrap() = delay;
    }

    pub fn fail_composite_with(&self, status: u16, message: &str) {
        *self.state.composite_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Replaces the `/composite` reply body verbatim.
    pub fn reply_composite_with(&self, body: Value) {
        *self.state.composite_override.lock().unwrap() = Some(body);
    }

    pub fn health_hits(&self) -> usize {
        self.state.health_hits.load(Ordering::SeqCst)
    }

    pub fn generate_hits(&self) -> usize {
        self.state.generate_hits.load(Ordering::SeqCst)
    }

    pub fn generate_bodies(&self) -> Vec<Value> {
        self.state.generate_bodies.lock().unwrap().clone()
    }

    pub fn composite_bodies(&self) -> Vec<Value> {
        self.state.composite_bodies.lock().unwrap().clone()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A local URL nothing is listening on.
pub async fn unreachable_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}
