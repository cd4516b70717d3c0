//! ComfyUI connector.
//!
//! One-way interaction with the node-graph backend: submit a graph, poll
//! history, read the queue, interrupt. Parse failures and non-success
//! statuses yield `None` to callers - the job pipeline decides what a
//! missing result means. Transient connection errors retry with the same
//! bounded backoff as the catalog store.

use crate::workflow::WorkflowGraph;
use crate::ComfyError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const HISTORY_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const BACKOFF_INITIAL_MS: u64 = 100;
const BACKOFF_FACTOR: u32 = 2;
const BACKOFF_MAX_MS: u64 = 5_000;
const MAX_ATTEMPTS: u32 = 5;

/// Queue occupancy reported by the backend.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueStatus {
    pub running: usize,
    pub pending: usize,
}

/// One output image/video entry inside a history node.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: Option<String>,
    #[serde(default, rename = "type")]
    pub output_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<OutputImage>,
    #[serde(default)]
    pub gifs: Vec<OutputImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status_str: Option<String>,
}

/// One prompt's history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: HistoryStatus,
    #[serde(default)]
    pub outputs: HashMap<String, NodeOutput>,
}

impl HistoryEntry {
    /// Every produced file, `subfolder/filename` joined.
    pub fn output_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for node in self.outputs.values() {
            for image in node.images.iter().chain(node.gifs.iter()) {
                match image.subfolder.as_deref() {
                    Some(sub) if !sub.is_empty() => {
                        files.push(format!("{}/{}", sub, image.filename))
                    }
                    _ => files.push(image.filename.clone()),
                }
            }
        }
        files.sort();
        files
    }

    pub fn has_outputs(&self) -> bool {
        self.outputs.values().any(|n| !n.images.is_empty() || !n.gifs.is_empty())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status.status_str.as_deref(), Some("error"))
    }

    pub fn is_complete(&self) -> bool {
        self.status.completed || self.has_outputs()
    }
}

/// Client for one ComfyUI instance.
#[derive(Clone)]
pub struct ComfyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ComfyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a workflow. Returns the backend prompt id, or `None` when the
    /// backend rejected the graph or answered with something unparseable.
    pub async fn submit_workflow(
        &self,
        graph: &WorkflowGraph,
        client_id: &str,
    ) -> Result<Option<String>, ComfyError> {
        let url = format!("{}/prompt", self.base_url);
        let body = serde_json::json!({
            "prompt": graph,
            "client_id": client_id,
        });

        let response = self
            .with_retry(|| {
                self.client
                    .post(&url)
                    .json(&body)
                    .timeout(SUBMIT_TIMEOUT)
                    .send()
            })
            .await?;

        if !response.status().is_success() {
            warn!("ComfyUI submit returned status {}", response.status());
            return Ok(None);
        }

        let value: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                warn!("ComfyUI submit response was not JSON: {}", e);
                return Ok(None);
            }
        };

        match value.get("prompt_id").and_then(|v| v.as_str()) {
            Some(prompt_id) => {
                info!("Submitted workflow to ComfyUI: {}", prompt_id);
                Ok(Some(prompt_id.to_string()))
            }
            None => {
                warn!("ComfyUI submit response had no prompt_id");
                Ok(None)
            }
        }
    }

    /// Current queue occupancy. Failures degrade to zeros at the caller.
    pub async fn get_queue_status(&self) -> Result<QueueStatus, ComfyError> {
        let url = format!("{}/queue", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await
            .map_err(ComfyError::from_reqwest)?;

        let value: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(_) => return Ok(QueueStatus::default()),
        };
        let count = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0)
        };
        Ok(QueueStatus {
            running: count("queue_running"),
            pending: count("queue_pending"),
        })
    }

    /// History for one prompt. `None` when the prompt is unknown (still
    /// queued), the call failed, or the body did not parse.
    pub async fn get_history(
        &self,
        backend_prompt_id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyError> {
        let url = format!("{}/history/{}", self.base_url, backend_prompt_id);
        let response = match self
            .client
            .get(&url)
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("History poll failed: {}", e);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            return Ok(None);
        }

        let mut body: HashMap<String, HistoryEntry> = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!("History body did not parse: {}", e);
                return Ok(None);
            }
        };
        Ok(body.remove(backend_prompt_id))
    }

    /// Best-effort interrupt of the currently running generation.
    pub async fn interrupt(&self) -> bool {
        let url = format!("{}/interrupt", self.base_url);
        match self
            .client
            .post(&url)
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Liveness probe against `/system_stats`, timeboxed to 5s.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/system_stats", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Retry transient connection errors with bounded exponential backoff.
    /// Timeouts and HTTP-level responses pass straight through.
    async fn with_retry<F, Fut>(&self, mut call: F) -> Result<reqwest::Response, ComfyError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut delay = Duration::from_millis(BACKOFF_INITIAL_MS);
        let mut last_error: Option<reqwest::Error> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match call().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => return Err(ComfyError::Timeout(SUBMIT_TIMEOUT)),
                Err(e) if e.is_connect() => {
                    warn!(
                        "ComfyUI connection attempt {}/{} failed: {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    last_error = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay =
                            (delay * BACKOFF_FACTOR).min(Duration::from_millis(BACKOFF_MAX_MS));
                    }
                }
                Err(e) => return Err(ComfyError::Http(e)),
            }
        }

        Err(ComfyError::Unavailable(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_output_files_join_subfolder() {
        let body = serde_json::json!({
            "status": {"completed": true, "status_str": "success"},
            "outputs": {
                "7": {"images": [
                    {"filename": "anime_gen_00001_.png", "subfolder": "", "type": "output"},
                    {"filename": "anime_gen_00002_.png", "subfolder": "batch", "type": "output"}
                ]}
            }
        });
        let entry: HistoryEntry = serde_json::from_value(body).unwrap();
        assert!(entry.is_complete());
        assert!(!entry.is_error());
        assert_eq!(
            entry.output_files(),
            vec!["anime_gen_00001_.png", "batch/anime_gen_00002_.png"]
        );
    }

    #[test]
    fn test_error_status_detected() {
        let body = serde_json::json!({
            "status": {"completed": false, "status_str": "error"},
            "outputs": {}
        });
        let entry: HistoryEntry = serde_json::from_value(body).unwrap();
        assert!(entry.is_error());
        assert!(!entry.is_complete());
    }

    #[test]
    fn test_empty_history_entry_defaults() {
        let entry: HistoryEntry = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!entry.is_complete());
        assert!(entry.output_files().is_empty());
    }
}
