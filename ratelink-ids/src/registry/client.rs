//! HTTP client for the registry's public roster endpoint

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::RegistryResponse;

const USER_AGENT: &str = concat!("ratelink-ids/", env!("CARGO_PKG_VERSION"));

/// Failure of a single roster download attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Registry returned HTTP {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of published rosters
///
/// The production implementation is [`RegistryClient`]; tests substitute
/// in-memory sources.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Download the roster published under `list_id`
    async fn fetch_roster(&self, list_id: &str) -> Result<RegistryResponse, FetchError>;
}

/// Registry client
pub struct RegistryClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    /// `timeout` bounds a whole request including the body download
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            // The registry drops idle keep-alive connections without notice
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn roster_url(&self, list_id: &str) -> String {
        format!("{}/competition/{}/applicants", self.base_url, list_id)
    }
}

#[async_trait]
impl RosterSource for RegistryClient {
    async fn fetch_roster(&self, list_id: &str) -> Result<RegistryResponse, FetchError> {
        let url = self.roster_url(list_id);
        tracing::debug!(list_id, url = %url, "Requesting roster");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let roster: RegistryResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::debug!(
            list_id,
            applicants = roster.applicants.len(),
            update_date = roster.update_date.as_deref().unwrap_or("-"),
            "Roster received"
        );

        Ok(roster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new("https://example.org/api/", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_roster_url_strips_trailing_slash() {
        let client = RegistryClient::new("https://example.org/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.roster_url("123"),
            "https://example.org/api/competition/123/applicants"
        );
    }
}
