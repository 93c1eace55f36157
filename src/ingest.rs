// ABOUTME: HTTP client for the remote ingestion endpoint and its wire models
// ABOUTME: One POST per batch; non-success statuses become transport errors with the body attached

use crate::error::{SyncError, SyncResult};
use crate::row::Row;
use crate::schema::ColumnDefinition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default path appended to the ingestion base URL.
pub const DEFAULT_SYNC_PATH: &str = "/synker/sync";
/// Default transport timeout for one batch request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Request body for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPayload<'a> {
    pub table_name: &'a str,
    pub table_config: &'a [ColumnDefinition],
    pub unique_keys: &'a [String],
    pub table_items: &'a [Row],
}

/// Success response from the ingestion endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// Destination for batches.
#[async_trait]
pub trait Ingest: Send + Sync {
    async fn send_batch(&self, payload: &SyncPayload<'_>) -> SyncResult<IngestResponse>;
}

pub struct HttpIngestClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpIngestClient {
    pub fn new(
        base_url: &str,
        sync_path: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, sync_path),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn join_endpoint(base_url: &str, sync_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if sync_path.starts_with('/') {
        format!("{}{}", base, sync_path)
    } else {
        format!("{}/{}", base, sync_path)
    }
}

/// Best-effort human message from an error response body.
fn error_message(body: &serde_json::Value, reason: &str) -> String {
    ["msg", "message"]
        .iter()
        .filter_map(|key| body.get(key).and_then(|v| v.as_str()))
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| reason.to_string())
}

#[async_trait]
impl Ingest for HttpIngestClient {
    async fn send_batch(&self, payload: &SyncPayload<'_>) -> SyncResult<IngestResponse> {
        let mut request = self.client.post(&self.endpoint).json(payload);

        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| SyncError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: format!("request to {} failed: {}", self.endpoint, e),
            body: None,
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        // Bodies that are not JSON still get reported as an empty object
        let body: serde_json::Value =
            serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({}));

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            return Err(SyncError::Transport {
                status: Some(status.as_u16()),
                message: error_message(&body, reason),
                body: Some(body),
            });
        }

        serde_json::from_value(body).map_err(|e| SyncError::Transport {
            status: Some(status.as_u16()),
            message: format!("unexpected response body: {}", e),
            body: None,
        })
    }
}
