//! Clients for the collaborating services.
//!
//! Every collaborator (the three rendering services and the compositor)
//! exposes `GET /health` plus one work endpoint. This module holds the pieces
//! that talk to them:
//!
//! - [`locator`] - resolves a [`ServiceCategory`] to a base URL.
//! - [`health`] - liveness probing before each call.
//! - [`dispatcher`] - one character's probe-then-render sequence.
//! - [`compositor`] - the final composite call.
//!
//! Every collaborator failure is converted into a [`glyphstrip_core::Error`]
//! here and recovered by the caller; none of them reach the HTTP handler.
//!
//! [`ServiceCategory`]: glyphstrip_core::ServiceCategory

pub mod compositor;
pub mod dispatcher;
pub mod health;
pub mod locator;

use core::time::Duration;
use glyphstrip_core::Error;
use reqwest::{Response, Url};
use serde::Deserialize;

/// Joins a collaborator base URL with an absolute path, keeping any path
/// prefix in the base (`http://host/prefix` + `/health` →
/// `http://host/prefix/health`).
pub fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Maps a `reqwest` send/read failure onto the pipeline error.
pub fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        Error::Transport {
            context: err.without_url().to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Converts a non-2xx response into [`Error::UpstreamStatus`], surfacing the
/// collaborator's `{error}` message when it sent one.
pub async fn status_error(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
    Error::UpstreamStatus {
        status: status.as_u16(),
        message,
    }
}
