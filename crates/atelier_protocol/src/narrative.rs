//! Narrative state types - per-scene, per-character continuity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Physical condition of a character's body/clothing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyState {
    Clean,
    Wet,
    Damp,
    Dry,
    Bloody,
    Stained,
    Dirty,
    Dusty,
    Sweaty,
}

impl BodyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyState::Clean => "clean",
            BodyState::Wet => "wet",
            BodyState::Damp => "damp",
            BodyState::Dry => "dry",
            BodyState::Bloody => "bloody",
            BodyState::Stained => "stained",
            BodyState::Dirty => "dirty",
            BodyState::Dusty => "dusty",
            BodyState::Sweaty => "sweaty",
        }
    }
}

impl fmt::Display for BodyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Character energy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Normal,
    Tired,
    Exhausted,
    Energized,
    Hyperactive,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyLevel::Normal => "normal",
            EnergyLevel::Tired => "tired",
            EnergyLevel::Exhausted => "exhausted",
            EnergyLevel::Energized => "energized",
            EnergyLevel::Hyperactive => "hyperactive",
        }
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a state row. `Manual` rows are never overwritten by
/// propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Auto,
    AiInitialized,
    Manual,
    Propagated,
}

impl StateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateSource::Auto => "auto",
            StateSource::AiInitialized => "ai_initialized",
            StateSource::Manual => "manual",
            StateSource::Propagated => "propagated",
        }
    }
}

impl std::str::FromStr for StateSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(StateSource::Auto),
            "ai_initialized" => Ok(StateSource::AiInitialized),
            "manual" => Ok(StateSource::Manual),
            "propagated" => Ok(StateSource::Propagated),
            _ => Err(format!("invalid state source: {s}")),
        }
    }
}

impl fmt::Display for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Injury severity. `Permanent` never decays; the rest walk toward `Healed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjurySeverity {
    Severe,
    Moderate,
    Minor,
    Healed,
    Permanent,
}

/// One injury carried by a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injury {
    #[serde(rename = "type")]
    pub injury_type: String,
    pub severity: InjurySeverity,
    #[serde(default)]
    pub location: Option<String>,
    /// Scenes remaining before the severity decays one step.
    #[serde(default = "Injury::default_countdown")]
    pub countdown: i32,
}

impl Injury {
    pub const fn default_countdown() -> i32 {
        2
    }
}

/// One row per (scene, character): everything continuity needs to redraw the
/// character consistently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSceneState {
    pub scene_id: String,
    pub character_slug: String,
    #[serde(default)]
    pub clothing: Option<String>,
    #[serde(default)]
    pub hair_state: Option<String>,
    #[serde(default)]
    pub injuries: Vec<Injury>,
    #[serde(default)]
    pub accessories: Vec<String>,
    pub body_state: BodyState,
    /// Free-form emotion word; the decay table maps unknown values to calm.
    pub emotional_state: String,
    pub energy_level: EnergyLevel,
    #[serde(default)]
    pub relationship_context: HashMap<String, String>,
    #[serde(default)]
    pub location_in_scene: Option<String>,
    #[serde(default)]
    pub carrying: Vec<String>,
    pub state_source: StateSource,
    /// Monotonic per (scene_id, character_slug); bumped on every write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl CharacterSceneState {
    pub fn new(scene_id: impl Into<String>, character_slug: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            character_slug: character_slug.into(),
            clothing: None,
            hair_state: None,
            injuries: Vec::new(),
            accessories: Vec::new(),
            body_state: BodyState::Clean,
            emotional_state: "calm".to_string(),
            energy_level: EnergyLevel::Normal,
            relationship_context: HashMap::new(),
            location_in_scene: None,
            carrying: Vec::new(),
            state_source: StateSource::Auto,
            version: 1,
            updated_at: Utc::now(),
        }
    }
}

/// Partial state write. Unset fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clothing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hair_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injuries: Option<Vec<Injury>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_state: Option<BodyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<EnergyLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_context: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_in_scene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrying: Option<Vec<String>>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        self.clothing.is_none()
            && self.hair_state.is_none()
            && self.injuries.is_none()
            && self.accessories.is_none()
            && self.body_state.is_none()
            && self.emotional_state.is_none()
            && self.energy_level.is_none()
            && self.relationship_context.is_none()
            && self.location_in_scene.is_none()
            && self.carrying.is_none()
    }

    /// Merge this patch over an existing state. Set fields win, unset fields
    /// keep the current value.
    pub fn apply_to(&self, state: &mut CharacterSceneState) {
        if let Some(v) = &self.clothing {
            state.clothing = Some(v.clone());
        }
        if let Some(v) = &self.hair_state {
            state.hair_state = Some(v.clone());
        }
        if let Some(v) = &self.injuries {
            state.injuries = v.clone();
        }
        if let Some(v) = &self.accessories {
            state.accessories = v.clone();
        }
        if let Some(v) = self.body_state {
            state.body_state = v;
        }
        if let Some(v) = &self.emotional_state {
            state.emotional_state = v.clone();
        }
        if let Some(v) = self.energy_level {
            state.energy_level = v;
        }
        if let Some(v) = &self.relationship_context {
            state.relationship_context = v.clone();
        }
        if let Some(v) = &self.location_in_scene {
            state.location_in_scene = Some(v.clone());
        }
        if let Some(v) = &self.carrying {
            state.carrying = v.clone();
        }
    }

    /// Build a patch containing every set field of `state`.
    pub fn from_state(state: &CharacterSceneState) -> Self {
        Self {
            clothing: state.clothing.clone(),
            hair_state: state.hair_state.clone(),
            injuries: Some(state.injuries.clone()),
            accessories: Some(state.accessories.clone()),
            body_state: Some(state.body_state),
            emotional_state: Some(state.emotional_state.clone()),
            energy_level: Some(state.energy_level),
            relationship_context: Some(state.relationship_context.clone()),
            location_in_scene: state.location_in_scene.clone(),
            carrying: Some(state.carrying.clone()),
        }
    }
}

// ============================================================================
// Regeneration queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationStatus {
    Pending,
    Processed,
}

impl RegenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegenerationStatus::Pending => "pending",
            RegenerationStatus::Processed => "processed",
        }
    }
}

/// An enqueued downstream invalidation. Inserts are idempotent on
/// `(scene_id, shot_id, source_scene_id, source_field)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationEntry {
    pub id: i64,
    pub scene_id: String,
    #[serde(default)]
    pub shot_id: Option<String>,
    pub reason: String,
    /// Higher = more urgent.
    pub priority: i64,
    #[serde(default)]
    pub source_scene_id: Option<String>,
    #[serde(default)]
    pub source_field: Option<String>,
    pub status: RegenerationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_merge_keeps_unset_fields() {
        let mut state = CharacterSceneState::new("scene-1", "hero");
        state.clothing = Some("travel cloak".to_string());
        state.emotional_state = "furious".to_string();

        let patch = StatePatch {
            body_state: Some(BodyState::Bloody),
            ..Default::default()
        };
        patch.apply_to(&mut state);

        assert_eq!(state.body_state, BodyState::Bloody);
        assert_eq!(state.clothing.as_deref(), Some("travel cloak"));
        assert_eq!(state.emotional_state, "furious");
    }

    #[test]
    fn test_empty_patch_detection() {
        assert!(StatePatch::default().is_empty());
        let patch = StatePatch {
            clothing: Some("armor".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_injury_serde_default_countdown() {
        let injury: Injury =
            serde_json::from_str(r#"{"type":"cut","severity":"moderate"}"#).unwrap();
        assert_eq!(injury.countdown, 2);
        assert_eq!(injury.severity, InjurySeverity::Moderate);
    }

    #[test]
    fn test_state_source_roundtrip() {
        for source in [
            StateSource::Auto,
            StateSource::AiInitialized,
            StateSource::Manual,
            StateSource::Propagated,
        ] {
            let parsed: StateSource = source.as_str().parse().unwrap();
            assert_eq!(source, parsed);
        }
    }
}
