//! Image-data strings.
//!
//! Every service boundary in the pipeline carries images inline as
//! `data:image/<format>;base64,<payload>`, so no component has to negotiate
//! content types out of band. [`ImageData`] is a validated wrapper around such
//! a string.

use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "data:image/";
const MARKER: &str = ";base64,";

/// Format tag used for locally synthesized SVG images.
pub const SVG_FORMAT: &str = "svg+xml";

/// A validated `data:image/<format>;base64,<payload>` string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageData {
    raw: String,
    // Byte offset of the payload within `raw`.
    payload_at: usize,
}

impl ImageData {
    /// Encodes raw image bytes under `image/<format>`.
    pub fn from_bytes(format: &str, bytes: &[u8]) -> Self {
        let mut raw = String::with_capacity(PREFIX.len() + format.len() + MARKER.len());
        raw.push_str(PREFIX);
        raw.push_str(format);
        raw.push_str(MARKER);
        let payload_at = raw.len();
        general_purpose::STANDARD.encode_string(bytes, &mut raw);
        Self { raw, payload_at }
    }

    /// Encodes an SVG document as `image/svg+xml`.
    pub fn svg(document: &str) -> Self {
        Self::from_bytes(SVG_FORMAT, document.as_bytes())
    }

    /// The full image-data string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The subtype after `image/`, e.g. `png` or `svg+xml`.
    pub fn format(&self) -> &str {
        &self.raw[PREFIX.len()..self.payload_at - MARKER.len()]
    }

    /// The base64 payload, undecoded.
    pub fn payload(&self) -> &str {
        &self.raw[self.payload_at..]
    }

    /// Decodes the payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(self.payload())
            .map_err(|e| Error::InvalidImageData {
                reason: format!("payload is not valid base64: {e}"),
            })
    }
}

fn is_format_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

impl FromStr for ImageData {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for ImageData {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        let rest = raw
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::InvalidImageData {
                reason: format!("missing `{PREFIX}` prefix"),
            })?;
        let marker = rest.find(MARKER).ok_or_else(|| Error::InvalidImageData {
            reason: format!("missing `{MARKER}` marker"),
        })?;
        let format = &rest[..marker];
        if format.is_empty() || !format.chars().all(is_format_char) {
            return Err(Error::InvalidImageData {
                reason: format!("invalid image format `{format}`"),
            });
        }
        let payload_at = PREFIX.len() + marker + MARKER.len();
        if payload_at == raw.len() {
            return Err(Error::InvalidImageData {
                reason: "empty payload".to_string(),
            });
        }
        let image = Self { raw, payload_at };
        image.decode()?;
        Ok(image)
    }
}

impl From<ImageData> for String {
    fn from(image: ImageData) -> Self {
        image.raw
    }
}

impl fmt::Display for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
