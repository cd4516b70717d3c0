//! Progress frames published by the status monitor.

use crate::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse backend-derived progress state for a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Queued => "queued",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One update fanned out to every subscriber of a job.
///
/// Delivery is best-effort at-most-once; consumers that miss frames
/// reconcile via `get_progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: JobId,
    pub backend_prompt_id: String,
    pub status: ProgressStatus,
    /// 0..=100; the monitor never publishes a backward move.
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Seconds since monitoring started.
    pub generation_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_frame_serde() {
        let frame = ProgressUpdate {
            job_id: JobId::new(),
            backend_prompt_id: "abc123".to_string(),
            status: ProgressStatus::Processing,
            progress_percent: 40,
            current_step: Some(8),
            total_steps: Some(20),
            estimated_completion: None,
            generation_time: 12.5,
            error_message: None,
            timestamp: Utc::now(),
        };
        let encoded = serde_json::to_value(&frame).unwrap();
        assert_eq!(encoded["status"], "processing");
        assert_eq!(encoded["progress_percent"], 40);
        assert!(encoded.get("error_message").is_none());
    }
}
