//! Client for the remote store.
//!
//! Two endpoints: `POST /api/ingest` takes a batch of collected items and
//! `POST /api/debug` stores an arbitrary diagnostic document. Each call is a
//! single round trip; retrying is left to the caller.

use crate::types::CollectedItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const INGEST_PATH: &str = "/api/ingest";
const DEBUG_PATH: &str = "/api/debug";

/// Errors talking to the remote store
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    Network(String),

    #[error("Server error: {status}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

/// Body of an ingest call
#[derive(Debug, Serialize)]
pub struct IngestRequest<'a> {
    pub items: &'a [CollectedItem],
    pub platform: &'a str,
    pub skip_duplicates: bool,
}

/// Counts returned by the store for an ingest call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub new_count: u64,
    pub duplicate_count: u64,
    pub failed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SavedDocument {
    id: String,
}

/// HTTP client bound to one store
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward a batch of items
    pub async fn ingest(&self, request: &IngestRequest<'_>) -> Result<IngestSummary, SyncError> {
        info!(
            "Sending {} items to {}{}",
            request.items.len(),
            self.base_url,
            INGEST_PATH
        );
        let summary: IngestSummary = self.post_json(INGEST_PATH, request).await?;
        info!(
            "Ingested: {} new, {} duplicates, {} failed",
            summary.new_count, summary.duplicate_count, summary.failed_count
        );
        Ok(summary)
    }

    /// Store a diagnostic document, returning the id it was saved under
    pub async fn save_diagnostics<T>(&self, document: &T) -> Result<String, SyncError>
    where
        T: Serialize + ?Sized,
    {
        let saved: SavedDocument = self.post_json(DEBUG_PATH, document).await?;
        info!("Saved diagnostics as {}", saved.id);
        Ok(saved.id)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, SyncError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            debug!("{} answered {}: {}", endpoint, status, message);
            return Err(SyncError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
