//! # Pipeline Types
//!
//! The values that flow through one `/generate` request:
//!
//! - [`CharacterRequest`] - one input character with its position and style.
//! - [`ServiceCategory`] - which rendering collaborator handles a character.
//! - [`DispatchResult`] - the outcome of one character's dispatch.
//! - [`CompositeOutcome`] - the outcome of the compositor call.
//!
//! Failures are modelled as tagged outcomes ([`DispatchOutcome`],
//! [`CompositeStatus`]) that always carry an image, so the fan-in side never
//! has to branch on errors.

use crate::ImageData;
use core::fmt;
use core::time::Duration;

/// Style used when a request does not name one.
pub const DEFAULT_STYLE: &str = "default";

/// The rendering collaborator responsible for a character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    Letter,
    Digit,
    Special,
}

impl ServiceCategory {
    /// All categories, in dispatch-table order.
    pub const ALL: [Self; 3] = [Self::Letter, Self::Digit, Self::Special];

    /// Classifies a character: `[A-Za-z]` is a letter, `[0-9]` a digit, and
    /// everything else (whitespace, punctuation, non-ASCII) is special.
    pub const fn classify(c: char) -> Self {
        if c.is_ascii_alphabetic() {
            Self::Letter
        } else if c.is_ascii_digit() {
            Self::Digit
        } else {
            Self::Special
        }
    }

    /// JSON field carrying the character in the `/generate` payload.
    pub const fn payload_field(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::Digit => "number",
            Self::Special => "character",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::Digit => "digit",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One character of the input text, bound to its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterRequest {
    character: char,
    position: usize,
    style: String,
}

impl CharacterRequest {
    pub fn new(character: char, position: usize, style: impl Into<String>) -> Self {
        Self {
            character,
            position,
            style: style.into(),
        }
    }

    /// Splits `text` into one request per character, positions `0..n`.
    pub fn from_text(text: &str, style: &str) -> Vec<Self> {
        text.chars()
            .enumerate()
            .map(|(position, character)| Self::new(character, position, style))
            .collect()
    }

    pub const fn character(&self) -> char {
        self.character
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub const fn category(&self) -> ServiceCategory {
        ServiceCategory::classify(self.character)
    }
}

/// How a single dispatch ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The collaborator rendered the character.
    Rendered,
    /// A local placeholder was substituted.
    Fallback { reason: String },
}

/// The image for one character plus how it was obtained.
#[derive(Clone, Debug)]
pub struct DispatchResult {
    pub position: usize,
    pub character: char,
    pub category: ServiceCategory,
    pub image: ImageData,
    pub outcome: DispatchOutcome,
    pub elapsed: Duration,
}

impl DispatchResult {
    pub fn rendered(request: &CharacterRequest, image: ImageData, elapsed: Duration) -> Self {
        Self {
            position: request.position(),
            character: request.character(),
            category: request.category(),
            image,
            outcome: DispatchOutcome::Rendered,
            elapsed,
        }
    }

    pub fn fallback(
        request: &CharacterRequest,
        image: ImageData,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            position: request.position(),
            character: request.character(),
            category: request.category(),
            image,
            outcome: DispatchOutcome::Fallback {
                reason: reason.into(),
            },
            elapsed,
        }
    }

    pub const fn success(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Rendered)
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            DispatchOutcome::Rendered => None,
            DispatchOutcome::Fallback { reason } => Some(reason),
        }
    }
}

/// How the composition step ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompositeStatus {
    Composited,
    Fallback { reason: String },
}

/// The final strip image plus how it was obtained.
#[derive(Clone, Debug)]
pub struct CompositeOutcome {
    pub image: ImageData,
    pub status: CompositeStatus,
    pub elapsed: Duration,
}

impl CompositeOutcome {
    pub const fn success(&self) -> bool {
        matches!(self.status, CompositeStatus::Composited)
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            CompositeStatus::Composited => None,
            CompositeStatus::Fallback { reason } => Some(reason),
        }
    }
}
