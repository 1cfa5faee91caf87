//! Error types for the glyphstrip pipeline.
//!
//! This module defines the central `Error` enum shared by the orchestrator and
//! its collaborator clients. It implements [`IntoResponse`] so handlers can
//! return it directly and have it mapped onto an HTTP status and a JSON
//! `{error}` body.
//!
//! ## Error Cases
//! - `InvalidRequest`: The top-level request was malformed (e.g. empty text).
//! - `PayloadTooLarge`: The request body exceeded the configured limit.
//! - `Configuration`: A service address could not be resolved.
//! - `HealthCheckFailed`: A collaborator failed its liveness probe.
//! - `Timeout`: A collaborator call exceeded its deadline.
//! - `Transport`: Connection-level failure talking to a collaborator.
//! - `UpstreamStatus`: A collaborator answered with a non-2xx status.
//! - `InvalidImageData`: An image-data string could not be parsed.
//! - `Internal`: Anything unexpected.
//!
//! Only `InvalidRequest`, `PayloadTooLarge` and `Internal` are expected to
//! reach a client. The collaborator variants are recovered inside the
//! dispatcher and compositor client, where their message becomes the
//! `errorDetail` of a fallback.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the glyphstrip pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client request was invalid.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The request body was larger than the server accepts.
    #[error("Payload too large: {reason}")]
    PayloadTooLarge { reason: String },

    /// No address is configured for a category or collaborator.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// The collaborator did not pass its liveness probe.
    #[error("health check failed")]
    HealthCheckFailed,

    /// The collaborator did not answer within the deadline.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Connection or protocol failure (refused, reset, DNS, bad body).
    #[error("transport error: {context}")]
    Transport { context: String },

    /// The collaborator answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// An image-data string did not match `data:image/<format>;base64,<payload>`.
    #[error("invalid image data: {reason}")]
    InvalidImageData { reason: String },

    /// Unexpected internal failure.
    #[error("internal error: {context}")]
    Internal { context: String },
}

/// JSON body returned to clients on error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    /// HTTP status a client sees for this error.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match self {
            Self::InvalidRequest { reason } | Self::PayloadTooLarge { reason } => reason,
            // Internal details stay in the logs.
            _ => "Failed to generate image".to_string(),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
