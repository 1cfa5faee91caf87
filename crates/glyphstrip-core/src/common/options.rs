//! Compositor layout options.
//!
//! Requests may send a partial `compositorOptions` object; missing fields take
//! the defaults below, so the compositor always receives a complete set.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Layout options forwarded to the compositor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompositorOptions {
    /// Horizontal gap between characters, in pixels.
    pub spacing: u32,
    /// CSS colour of the strip background.
    pub background_color: String,
    /// Characters taller than this are scaled down by the compositor.
    pub max_height: u32,
    /// Border around the strip, in pixels.
    pub padding: u32,
    /// Output subtype, e.g. `png` or `jpeg`.
    pub format: String,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            spacing: 5,
            background_color: "#ffffff".to_string(),
            max_height: 200,
            padding: 20,
            format: "png".to_string(),
        }
    }
}

impl CompositorOptions {
    /// Rejects options the compositor could not honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_height == 0 {
            return Err(Error::InvalidRequest {
                reason: "compositorOptions.maxHeight must be greater than 0".to_string(),
            });
        }
        if self.format.is_empty() || !self.format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidRequest {
                reason: format!("compositorOptions.format `{}` is not supported", self.format),
            });
        }
        if self.background_color.trim().is_empty() {
            return Err(Error::InvalidRequest {
                reason: "compositorOptions.backgroundColor must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
