//! Response-level timing summary.
//!
//! [`RequestMetrics`] is assembled once, after the compositor step, from every
//! [`DispatchResult`] plus the [`CompositeOutcome`]. Its JSON shape is what
//! the frontend charts.

use crate::{CompositeOutcome, DispatchResult};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Breakdown entry name used for the compositor step.
pub const COMPOSITOR_SERVICE_NAME: &str = "image-compositor";

/// Timing and outcome of one collaborator call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTiming {
    pub name: String,
    #[serde(rename = "time")]
    pub elapsed_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary attached to every `/generate` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    #[serde(rename = "totalTime")]
    pub total_elapsed_ms: u64,
    pub services_used: usize,
    pub characters_processed: usize,
    pub service_breakdown: Vec<ServiceTiming>,
    /// True iff every character and the compositor succeeded.
    pub overall_success: bool,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl RequestMetrics {
    /// Builds the summary. `results` must already be in position order.
    pub fn collect(results: &[DispatchResult], composite: &CompositeOutcome, total: Duration) -> Self {
        let mut service_breakdown: Vec<ServiceTiming> = results
            .iter()
            .map(|r| ServiceTiming {
                name: format!("{}-{}", r.category, r.character.to_uppercase()),
                elapsed_ms: millis(r.elapsed),
                success: r.success(),
                error: r.error_detail().map(str::to_string),
            })
            .collect();

        service_breakdown.push(ServiceTiming {
            name: COMPOSITOR_SERVICE_NAME.to_string(),
            elapsed_ms: millis(composite.elapsed),
            success: composite.success(),
            error: composite.error_detail().map(str::to_string),
        });

        let overall_success = service_breakdown.iter().all(|s| s.success);

        Self {
            total_elapsed_ms: millis(total),
            services_used: service_breakdown.len(),
            characters_processed: results.len(),
            service_breakdown,
            overall_success,
        }
    }

    /// Number of characters that were replaced by a fallback image.
    pub fn fallback_count(&self) -> usize {
        self.service_breakdown
            .iter()
            .filter(|s| !s.success && s.name != COMPOSITOR_SERVICE_NAME)
            .count()
    }
}
