use super::{endpoint, health::HealthProber, status_error, transport_error};
use core::time::Duration;
use glyphstrip_core::{
    CompositeOutcome, CompositeStatus, CompositorOptions, DispatchResult, Error, ImageData,
    Result, fallback,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Path the compositor accepts work on.
pub const COMPOSITE_PATH: &str = "/composite";

#[derive(Serialize)]
struct CompositeRequest<'a> {
    images: Vec<&'a ImageData>,
    options: &'a CompositorOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResponse {
    composite_image: ImageData,
}

/// Client for the compositing collaborator.
///
/// [`composite`](Self::composite) always yields an image: if the compositor is
/// unhealthy or the call fails, the strip is assembled locally with
/// [`fallback::naive_composite`].
#[derive(Clone, Debug)]
pub struct CompositorClient {
    client: Client,
    base: Url,
    prober: HealthProber,
    timeout: Duration,
}

impl CompositorClient {
    pub const fn new(client: Client, base: Url, prober: HealthProber, timeout: Duration) -> Self {
        Self {
            client,
            base,
            prober,
            timeout,
        }
    }

    #[tracing::instrument(name = "composite", skip_all, fields(images = results.len()))]
    pub async fn composite(
        &self,
        results: &[DispatchResult],
        options: &CompositorOptions,
    ) -> CompositeOutcome {
        let start = Instant::now();

        let mut ordered: Vec<&DispatchResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.position);
        let images: Vec<&ImageData> = ordered.iter().map(|r| &r.image).collect();

        match self.try_composite(&images, options).await {
            Ok(image) => CompositeOutcome {
                image,
                status: CompositeStatus::Composited,
                elapsed: start.elapsed(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "compositor unavailable, compositing locally");
                CompositeOutcome {
                    image: fallback::naive_composite(&images),
                    status: CompositeStatus::Fallback {
                        reason: e.to_string(),
                    },
                    elapsed: start.elapsed(),
                }
            }
        }
    }

    async fn try_composite(
        &self,
        images: &[&ImageData],
        options: &CompositorOptions,
    ) -> Result<ImageData> {
        if !self.prober.probe(&self.base).await {
            return Err(Error::HealthCheckFailed);
        }

        let response = self
            .client
            .post(endpoint(&self.base, COMPOSITE_PATH))
            .json(&CompositeRequest {
                images: images.to_vec(),
                options,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let parsed: CompositeResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Transport {
                context: format!("invalid compositor response: {e}"),
            })?;
        Ok(parsed.composite_image)
    }
}
