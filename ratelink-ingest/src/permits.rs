//! Bounded concurrency for scraper HTTP traffic
//!
//! One `HttpPermits` is built at startup and shared by every loader. A
//! request holds a permit of its source and a global permit for as long as
//! it runs. The source permit is taken first so a saturated source does not
//! sit on global permits other sources could use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PermitSettings;

const USER_AGENT: &str = concat!("ratelink-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermitError {
    #[error("Cancelled while waiting for an HTTP permit")]
    Cancelled,

    #[error("HTTP permits closed")]
    Closed,
}

/// Held while a request is in flight; dropping it releases both permits
#[derive(Debug)]
pub struct HttpPermit {
    _source: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Global and per-source request limits
pub struct HttpPermits {
    global: Arc<Semaphore>,
    per_source_limit: usize,
    sources: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HttpPermits {
    pub fn new(global: usize, per_source: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global.max(1))),
            per_source_limit: per_source.max(1),
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &PermitSettings) -> Self {
        Self::new(settings.global, settings.per_source)
    }

    fn source_semaphore(&self, source: &str) -> Arc<Semaphore> {
        let mut sources = self.sources.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sources
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    /// Permits of `source` not currently held
    pub fn available_for(&self, source: &str) -> usize {
        self.source_semaphore(source).available_permits()
    }

    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    /// Wait for a source permit and a global permit
    pub async fn acquire(&self, source: &str, cancel: &CancellationToken) -> Result<HttpPermit, PermitError> {
        let source_semaphore = self.source_semaphore(source);

        let source_permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PermitError::Cancelled),
            permit = source_semaphore.acquire_owned() => permit.map_err(|_| PermitError::Closed)?,
        };

        let global_permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PermitError::Cancelled),
            permit = self.global.clone().acquire_owned() => permit.map_err(|_| PermitError::Closed)?,
        };

        Ok(HttpPermit {
            _source: source_permit,
            _global: global_permit,
        })
    }
}

#[derive(Debug, Error)]
pub enum SourceHttpError {
    #[error(transparent)]
    Permit(#[from] PermitError),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// reqwest client whose requests go through [`HttpPermits`]
pub struct SourceHttp {
    http_client: reqwest::Client,
    permits: Arc<HttpPermits>,
}

impl SourceHttp {
    pub fn new(permits: Arc<HttpPermits>, timeout: Duration) -> Result<Self, SourceHttpError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceHttpError::Request(e.to_string()))?;

        Ok(Self { http_client, permits })
    }

    pub fn permits(&self) -> &Arc<HttpPermits> {
        &self.permits
    }

    /// GET `url` on behalf of `source` and return the body as text
    pub async fn get_text(
        &self,
        source: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, SourceHttpError> {
        let _permit = self.permits.acquire(source, cancel).await?;
        debug!(source, url, "Fetching page");

        let request = async {
            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| SourceHttpError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceHttpError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response
                .text()
                .await
                .map_err(|e| SourceHttpError::Request(e.to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PermitError::Cancelled.into()),
            result = request => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let permits = HttpPermits::new(2, 1);
        let cancel = CancellationToken::new();

        let permit = permits.acquire("msu", &cancel).await.unwrap();
        assert_eq!(permits.available_for("msu"), 0);
        assert_eq!(permits.available_global(), 1);
        assert_eq!(permits.available_for("spbu"), 1);

        drop(permit);
        assert_eq!(permits.available_for("msu"), 1);
        assert_eq!(permits.available_global(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_wins_immediately() {
        let permits = HttpPermits::new(1, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = permits.acquire("msu", &cancel).await;
        assert_eq!(result.unwrap_err(), PermitError::Cancelled);
        assert_eq!(permits.available_global(), 1);
    }
}
