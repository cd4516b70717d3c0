//! Generation job entity and its status state machine.

use crate::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Kind of generative work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Image,
    Video,
    Batch,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Image => "image",
            JobType::Video => "video",
            JobType::Batch => "batch",
        }
    }

    /// Wall-clock monitoring bound for this job type, in seconds.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            JobType::Image => 120,
            JobType::Video | JobType::Batch => 300,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when parsing a JobType from string.
#[derive(Debug, Error, Clone)]
#[error("invalid job type: {0}")]
pub struct JobTypeParseError(String);

impl std::str::FromStr for JobType {
    type Err = JobTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(JobType::Image),
            "video" => Ok(JobType::Video),
            "batch" => Ok(JobType::Batch),
            _ => Err(JobTypeParseError(s.to_string())),
        }
    }
}

// ============================================================================
// Job status state machine
// ============================================================================

/// Job lifecycle states.
///
/// `queued → processing` on submit success; any non-terminal state can be
/// cancelled; `processing` resolves to `completed`, `failed`, or `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled
        )
    }

    /// Get valid transitions from this state.
    pub fn valid_transitions(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[JobStatus::Processing, JobStatus::Cancelled],
            JobStatus::Processing => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Timeout,
                JobStatus::Cancelled,
            ],
            JobStatus::Completed
            | JobStatus::Failed
            | JobStatus::Timeout
            | JobStatus::Cancelled => &[],
        }
    }

    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when parsing a JobStatus from string.
#[derive(Debug, Error, Clone)]
#[error("invalid job status: {0}")]
pub struct JobStatusParseError(String);

impl std::str::FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "timeout" => Ok(JobStatus::Timeout),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(JobStatusParseError(s.to_string())),
        }
    }
}

// ============================================================================
// Job entity
// ============================================================================

/// A unit of generative work.
///
/// The in-memory job cache holds these; every state change is mirrored to
/// the catalog store. A job owns its outputs until it reaches a terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub prompt: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub status: JobStatus,
    /// Opaque prompt id returned by the generation backend.
    pub backend_id: Option<String>,
    pub output_path: Option<String>,
    pub organized_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub project_id: Option<String>,
    pub character_id: Option<String>,
    pub total_time_secs: Option<f64>,
}

impl Job {
    pub fn new(job_type: JobType, prompt: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            prompt: prompt.into(),
            parameters: HashMap::new(),
            status: JobStatus::Queued,
            backend_id: None,
            output_path: None,
            organized_path: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            project_id: None,
            character_id: None,
            total_time_secs: None,
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Aggregate job counts for the statistics endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Timeout,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_terminal_detection() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));

        assert!(JobStatus::Processing.can_transition_to(JobStatus::Timeout));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));

        assert!(JobStatus::Completed.valid_transitions().is_empty());
    }

    #[test]
    fn test_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&JobType::Video).unwrap(),
            "\"video\""
        );
    }

    #[test]
    fn test_timeout_bounds() {
        assert_eq!(JobType::Image.timeout_secs(), 120);
        assert_eq!(JobType::Video.timeout_secs(), 300);
    }
}
