//! Shared model for the glyphstrip pipeline.
//!
//! ## Structure
//!
//! - [`types`] - requests, categories and per-character/composite results.
//! - [`image`] - the `data:image/<format>;base64,<payload>` codec.
//! - [`fallback`] - locally synthesized placeholder images.
//! - [`metrics`] - the response-level timing summary.
//! - [`options`] - compositor options and their defaults.
//! - [`error`] - the unified [`Error`] type.

pub mod error;
pub mod fallback;
pub mod image;
pub mod metrics;
pub mod options;
pub mod types;

pub use error::{Error, Result};
pub use image::ImageData;
pub use metrics::{RequestMetrics, ServiceTiming};
pub use options::CompositorOptions;
pub use types::{
    CharacterRequest, CompositeOutcome, CompositeStatus, DEFAULT_STYLE, DispatchOutcome,
    DispatchResult, ServiceCategory,
};
