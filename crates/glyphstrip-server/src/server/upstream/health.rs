use super::{endpoint, status_error, transport_error};
use core::time::Duration;
use glyphstrip_core::Result;
use reqwest::{Client, Url};

/// Path every collaborator serves its liveness check on.
pub const HEALTH_PATH: &str = "/health";

/// Liveness probe run before each collaborator call.
///
/// Results are never cached: every dispatch probes its own service, trading a
/// round-trip for a fresh answer.
#[derive(Clone, Debug)]
pub struct HealthProber {
    client: Client,
    timeout: Duration,
}

impl HealthProber {
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Performs `GET {base}/health`, failing on timeout, transport error or a
    /// non-2xx status.
    pub async fn check(&self, base: &Url) -> Result<()> {
        let response = self
            .client
            .get(endpoint(base, HEALTH_PATH))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    /// Like [`check`](Self::check), but reduced to a liveness signal. A failed
    /// probe is logged and never treated as fatal.
    pub async fn probe(&self, base: &Url) -> bool {
        match self.check(base).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(service = %base, error = %e, "health probe failed");
                false
            }
        }
    }
}
