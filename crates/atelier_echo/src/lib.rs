//! Echo LLM collaborator client.
//!
//! One endpoint: `POST /api/echo/query`. The response body is free text
//! that often - but not always - contains JSON, so callers go through
//! [`extract_json`] and must keep a non-JSON fallback.

use atelier_protocol::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for Echo calls.
pub type Result<T> = std::result::Result<T, EchoError>;

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("Echo request failed: {0}")]
    Http(reqwest::Error),

    #[error("Echo returned status {0}")]
    Status(u16),

    #[error("Echo call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for EchoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // Timeout duration is attached at the call site; this variant
            // only fires for reqwest-internal timeouts.
            return EchoError::Timeout(Duration::ZERO);
        }
        EchoError::Http(e)
    }
}

impl From<EchoError> for CoreError {
    fn from(e: EchoError) -> Self {
        match e {
            EchoError::Timeout(d) => CoreError::Timeout(format!("echo call after {d:?}")),
            other => CoreError::Upstream(other.to_string()),
        }
    }
}

/// Request body for `/api/echo/query`.
#[derive(Debug, Clone, Serialize)]
pub struct EchoQuery {
    pub query: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

impl EchoQuery {
    pub fn new(query: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id: conversation_id.into(),
            context: serde_json::Value::Null,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EchoMetadata {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EchoResponse {
    pub response: String,
    #[serde(default)]
    pub metadata: EchoMetadata,
}

/// Thin reqwest wrapper around the Echo endpoint.
#[derive(Clone)]
pub struct EchoClient {
    client: reqwest::Client,
    base_url: String,
}

impl EchoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Send a query with the given wall-clock timeout.
    pub async fn query(&self, query: &EchoQuery, timeout: Duration) -> Result<EchoResponse> {
        let url = format!("{}/api/echo/query", self.base_url);
        debug!("Echo query ({} chars) -> {}", query.query.len(), url);

        let response = self
            .client
            .post(&url)
            .json(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EchoError::Timeout(timeout)
                } else {
                    EchoError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Echo returned non-success status {}", status);
            return Err(EchoError::Status(status.as_u16()));
        }

        Ok(response.json::<EchoResponse>().await?)
    }
}

/// Pull the first JSON object or array out of free-form LLM text.
///
/// Handles fenced ```json blocks, leading chatter, and trailing prose.
/// Returns `None` when nothing parseable is found - the caller falls back
/// to text heuristics.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    // Whole body is JSON already.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    // Fenced block.
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(after[..end].trim()) {
                return Some(value);
            }
        }
    }

    // First balanced object or array.
    for open in ['{', '['] {
        if let Some(candidate) = balanced_slice(text, open) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                return Some(value);
            }
        }
    }

    None
}

fn balanced_slice(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"content_type": "video"}"#).unwrap();
        assert_eq!(value["content_type"], "video");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here is my analysis:\n```json\n{\"confidence\": 0.9}\n```\nHope it helps!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["confidence"], 0.9);
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "Sure! The plan is {\"scope\": \"character_scene\", \"names\": [\"Kai\"]} as requested.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["names"][0], "Kai");
    }

    #[test]
    fn test_extract_handles_braces_in_strings() {
        let text = r#"prefix {"note": "curly } inside", "n": 1} suffix"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_extract_non_json_returns_none() {
        assert!(extract_json("no structured data here").is_none());
    }
}
