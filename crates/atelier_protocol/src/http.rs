//! HTTP surface bodies and boundary validation.
//!
//! Sanitization happens here, once, before anything else sees the text:
//! NUL bytes and control characters (except `\n` and `\t`) are stripped,
//! then length limits apply. All field-accepting bodies reject unknown
//! fields.

use crate::catalog::{Appearance, VoiceProfile};
use crate::error::{CoreError, CoreResult};
use crate::ids::JobId;
use crate::intent::{AmbiguityDetection, ClarificationQuestion};
use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_PROMPT_CHARS: usize = 1000;
pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 2048;
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 300;

// ============================================================================
// Validation helpers
// ============================================================================

/// Strip NUL bytes and non-printable control characters, keeping `\n` and
/// `\t`.
pub fn sanitize_prompt(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Sanitize then enforce the prompt length contract.
pub fn validate_prompt(raw: &str) -> CoreResult<String> {
    let cleaned = sanitize_prompt(raw);
    if cleaned.trim().is_empty() {
        return Err(CoreError::bad_input("prompt must not be empty"));
    }
    if cleaned.chars().count() > MAX_PROMPT_CHARS {
        return Err(CoreError::bad_input(format!(
            "prompt exceeds {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(cleaned)
}

/// Round a dimension down to the nearest multiple of 64.
pub fn round_down_64(value: u32) -> u32 {
    value - (value % 64)
}

/// Validate a width/height value: within [64, 2048], then rounded down to a
/// 64-multiple.
pub fn validate_dimension(value: u32, field: &str) -> CoreResult<u32> {
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        return Err(CoreError::bad_input(format!(
            "{field} must be between {MIN_DIMENSION} and {MAX_DIMENSION}, got {value}"
        )));
    }
    Ok(round_down_64(value))
}

pub fn validate_duration(value: u32) -> CoreResult<u32> {
    if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&value) {
        return Err(CoreError::bad_input(format!(
            "duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds, got {value}"
        )));
    }
    Ok(value)
}

// ============================================================================
// Generation endpoints
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub style_preset: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
    /// Seconds, rough estimate from the classifier.
    pub estimated_time: f64,
    pub websocket_url: String,
}

/// Returned instead of a job when a blocking ambiguity needs the user.
#[derive(Debug, Clone, Serialize)]
pub struct ClarificationResponse {
    pub status: &'static str,
    pub questions: Vec<ClarificationQuestion>,
    pub ambiguities: Vec<AmbiguityDetection>,
}

impl ClarificationResponse {
    pub fn new(questions: Vec<ClarificationQuestion>, ambiguities: Vec<AmbiguityDetection>) -> Self {
        Self {
            status: "clarification_required",
            questions,
            ambiguities,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_preloaded: bool,
    pub queue_size: usize,
    pub active_websockets: usize,
    pub jobs_in_memory: usize,
}

// ============================================================================
// Catalog endpoints
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_style: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCharacterRequest {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design_prompt: Option<String>,
    #[serde(default)]
    pub appearance: Option<Appearance>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub personality_tags: Option<Vec<String>>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub relationships: Option<HashMap<String, String>>,
    #[serde(default)]
    pub voice_profile: Option<VoiceProfile>,
    #[serde(default)]
    pub lora_path: Option<String>,
    #[serde(default)]
    pub lora_trigger: Option<String>,
}

/// Multi-field merge-update for a character. Only these fields may be
/// patched; unset fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharacterPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design_prompt: Option<String>,
    #[serde(default)]
    pub appearance: Option<Appearance>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub personality_tags: Option<Vec<String>>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub relationships: Option<HashMap<String, String>>,
    #[serde(default)]
    pub voice_profile: Option<VoiceProfile>,
    #[serde(default)]
    pub lora_path: Option<String>,
    #[serde(default)]
    pub lora_trigger: Option<String>,
}

impl CharacterPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.design_prompt.is_none()
            && self.appearance.is_none()
            && self.personality.is_none()
            && self.personality_tags.is_none()
            && self.background.is_none()
            && self.role.is_none()
            && self.relationships.is_none()
            && self.voice_profile.is_none()
            && self.lora_path.is_none()
            && self.lora_trigger.is_none()
    }
}

/// Structured error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_controls() {
        let cleaned = sanitize_prompt("a\u{0}b\u{7}c\nd\te");
        assert_eq!(cleaned, "abc\nd\te");
    }

    #[test]
    fn test_prompt_length_boundary() {
        assert!(validate_prompt(&"a".repeat(1000)).is_ok());
        assert!(validate_prompt(&"a".repeat(1001)).is_err());
        assert!(validate_prompt("   ").is_err());
    }

    #[test]
    fn test_dimension_boundaries() {
        assert!(validate_dimension(63, "width").is_err());
        assert_eq!(validate_dimension(64, "width").unwrap(), 64);
        assert_eq!(validate_dimension(1000, "width").unwrap(), 960);
        assert_eq!(validate_dimension(2048, "height").unwrap(), 2048);
        assert!(validate_dimension(2049, "height").is_err());
    }

    #[test]
    fn test_duration_boundaries() {
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(1).is_ok());
        assert!(validate_duration(300).is_ok());
        assert!(validate_duration(301).is_err());
    }

    #[test]
    fn test_generate_request_rejects_unknown_fields() {
        let body = r#"{"prompt":"hi","width":512,"height":512,"sneaky":true}"#;
        assert!(serde_json::from_str::<GenerateRequest>(body).is_err());
    }

    #[test]
    fn test_character_patch_empty_detection() {
        let patch: CharacterPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
        let patch: CharacterPatch =
            serde_json::from_str(r#"{"role":"protagonist"}"#).unwrap();
        assert!(!patch.is_empty());
    }
}
