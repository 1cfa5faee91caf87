//! HTTP surface of the orchestrator.
//!
//! ## Structure
//!
//! - [`handler`] - shared state ([`handler::GlyphService`]), the router and
//!   the `/generate` and `/health` handlers.

pub mod handler;
