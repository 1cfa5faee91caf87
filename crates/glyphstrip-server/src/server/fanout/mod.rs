//! Fan-out / fan-in of per-character dispatches.
//!
//! - [`aggregator`] - runs every dispatch of a request concurrently and
//!   restores position order.

pub mod aggregator;
