//! Source audio fetching
//!
//! The fetcher is an external collaborator consumed behind a capability
//! trait. [`HttpFetcher`] is the bundled implementation: bounded request
//! timeout and a single retry before the stage fails.

use crate::error::StageError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// URL → bytes collaborator
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the source payload. Called with an already-validated URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError>;
}

/// HTTP source fetcher with explicit timeout and one retry
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("musemo-engine/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, StageError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| StageError::Fetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StageError::Fetch(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::Fetch(format!("body read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError> {
        match self.fetch_once(url).await {
            Ok(bytes) => {
                debug!(url = %url, len = bytes.len(), "Source fetched");
                Ok(bytes)
            }
            Err(first_error) => {
                // One retry, then fail the stage
                warn!(url = %url, error = %first_error, "Fetch failed, retrying once");
                self.fetch_once(url).await
            }
        }
    }
}

/// Validate a source URL before the fetch stage is attempted
///
/// A malformed locator is a structural input error, not a stage failure.
pub fn validate_source_url(url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("malformed source_url: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported source_url scheme: {}", other)),
    }
}
