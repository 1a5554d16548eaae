//! Batch HTTP client for the resolution service
//!
//! Requests are split into batches the service accepts. While the service
//! is still downloading rosters it answers 503; the client waits and sends
//! the same batch again for as long as that lasts. Callers bound the total
//! wait by dropping the future.

use async_trait::async_trait;
use ratelink_common::{Error, IdResolver, ResolveRequestItem, ResolveResponseItem, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ResolverClientSettings;

const USER_AGENT: &str = concat!("ratelink-ingest/", env!("CARGO_PKG_VERSION"));

/// Client for `POST /api/v1/resolve`
pub struct ResolverClient {
    http_client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    unavailable_delay: Duration,
}

impl ResolverClient {
    pub fn new(settings: &ResolverClientSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            batch_size: settings.batch_size.max(1),
            unavailable_delay: settings.unavailable_delay(),
        })
    }

    fn resolve_url(&self) -> String {
        format!("{}/api/v1/resolve", self.base_url)
    }

    /// Liveness probe of the service
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/api/v1/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(format!("health check returned {}", response.status())))
        }
    }

    async fn resolve_chunk(&self, chunk: &[ResolveRequestItem]) -> Result<Vec<ResolveResponseItem>> {
        let body = serde_json::json!({ "items": chunk });
        let url = self.resolve_url();
        let mut unavailable_count: u32 = 0;

        loop {
            let response = self
                .http_client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::SERVICE_UNAVAILABLE {
                unavailable_count += 1;
                warn!(
                    attempt = unavailable_count,
                    delay_secs = self.unavailable_delay.as_secs_f64(),
                    "Resolution service not ready, retrying"
                );
                tokio::time::sleep(self.unavailable_delay).await;
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::Http(format!("resolve returned {}: {}", status, text)));
            }

            let items: Vec<ResolveResponseItem> = response
                .json()
                .await
                .map_err(|e| Error::Http(format!("Invalid resolve response: {}", e)))?;
            return Ok(items);
        }
    }
}

#[async_trait]
impl IdResolver for ResolverClient {
    async fn resolve_batch(&self, items: Vec<ResolveRequestItem>) -> Result<Vec<ResolveResponseItem>> {
        let batches = items.len().div_ceil(self.batch_size);
        let mut results = Vec::with_capacity(items.len());

        for (index, chunk) in items.chunks(self.batch_size).enumerate() {
            debug!(batch = index + 1, batches, size = chunk.len(), "Sending resolve batch");
            results.extend(self.resolve_chunk(chunk).await?);
        }

        info!(requested = items.len(), resolved = results.len(), "Resolve batches complete");
        Ok(results)
    }
}
