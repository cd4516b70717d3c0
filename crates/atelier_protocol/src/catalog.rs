//! Catalog entities - projects, characters, scenes, shots, episodes.
//!
//! The catalog store is the single source of truth for all of these; the
//! reference index only ever holds `(table, id)` pointers back to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A creative work. Owns characters and scenes; destroyed only by explicit
/// delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Name of the generation style every character in this project shares.
    #[serde(default)]
    pub default_style: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project-wide visual contract. All characters in a project render with the
/// same style so outputs stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStyle {
    pub name: String,
    pub checkpoint: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub cfg_scale: f64,
    pub steps: i64,
    pub sampler: String,
    pub scheduler: String,
    pub width: i64,
    pub height: i64,
}

/// Structured character appearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clothing: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weapons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_features: Vec<String>,
}

/// Character voice profile, passed through to the synthesis collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// A subject. Addressed everywhere by `slug`, which is unique per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Base visual description, used verbatim when composing prompts.
    #[serde(default)]
    pub design_prompt: Option<String>,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub personality_tags: Vec<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub relationships: HashMap<String, String>,
    #[serde(default)]
    pub voice_profile: VoiceProfile,
    /// Weight-adapter file for this character, if one was trained.
    #[serde(default)]
    pub lora_path: Option<String>,
    /// Trigger token - the LoRA does not activate without it in the prompt.
    #[serde(default)]
    pub lora_trigger: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derive the deterministic addressing slug from a display name.
///
/// Lowercase, whitespace runs become `_`, anything outside `[a-z0-9_-]` is
/// dropped.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push('_');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-' {
            out.push(ch);
        }
    }
    out
}

/// An ordered unit of narrative. Order within a project is `scene_number`
/// ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub project_id: String,
    pub scene_number: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub narrative_text: Option<String>,
    #[serde(default)]
    pub generation_status: Option<String>,
    #[serde(default)]
    pub output_video_path: Option<String>,
    #[serde(default)]
    pub dialogue_audio_path: Option<String>,
}

/// A sub-unit of a scene with its own prompt and character list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    pub scene_id: String,
    pub shot_number: i64,
    #[serde(default)]
    pub shot_type: Option<String>,
    #[serde(default)]
    pub camera_angle: Option<String>,
    #[serde(default)]
    pub motion_prompt: Option<String>,
    #[serde(default)]
    pub characters_present: Vec<String>,
    #[serde(default)]
    pub dialogue_text: Option<String>,
    #[serde(default)]
    pub dialogue_character: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output_video_path: Option<String>,
}

/// Organizational grouping of scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeScene {
    pub episode_id: String,
    pub scene_id: String,
    pub position: i64,
}

/// One record per reviewed generation, keyed by the backend prompt id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFeedback {
    pub generation_id: String,
    pub prompt_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub generation_params: serde_json::Value,
    pub contract_passed: bool,
    pub quality_score: f64,
    #[serde(default)]
    pub structural_gates: serde_json::Value,
    #[serde(default)]
    pub motion_gates: serde_json::Value,
    #[serde(default)]
    pub quality_gates: serde_json::Value,
    #[serde(default)]
    pub frame_samples: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub successful_elements: Vec<String>,
    #[serde(default)]
    pub failed_elements: Vec<String>,
    #[serde(default)]
    pub analysis_notes: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub file_size_bytes: Option<i64>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub frame_count: Option<i64>,
    #[serde(default)]
    pub human_score: Option<f64>,
    #[serde(default)]
    pub human_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kai"), "kai");
        assert_eq!(slugify("Mira  Stormblade"), "mira_stormblade");
        assert_eq!(slugify("  D'Artagnan the 3rd! "), "dartagnan_the_3rd");
        assert_eq!(slugify("already_good-slug"), "already_good-slug");
    }

    #[test]
    fn test_appearance_roundtrip() {
        let appearance = Appearance {
            hair: Some("silver, long".to_string()),
            eyes: Some("violet".to_string()),
            key_colors: vec!["silver".to_string(), "violet".to_string()],
            ..Default::default()
        };
        let encoded = serde_json::to_string(&appearance).unwrap();
        let decoded: Appearance = serde_json::from_str(&encoded).unwrap();
        assert_eq!(appearance, decoded);
    }
}
