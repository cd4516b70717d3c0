//! Intent classification and ambiguity-resolution types.
//!
//! A free-text request is classified into an [`IntentClassification`];
//! detected problems become [`AmbiguityDetection`]s, each resolved into a
//! [`ResolutionResult`]. A blocking ambiguity prevents execution until a
//! user answers the clarification.

use crate::ids::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Classification enums
// ============================================================================

/// Primary content type of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Image,
    Video,
    Audio,
    MixedMedia,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Image => "image",
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::MixedMedia => "mixed_media",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scope of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationScope {
    CharacterProfile,
    CharacterScene,
    Environment,
    ActionSequence,
    DialogueScene,
    FullEpisode,
    BatchGeneration,
}

impl GenerationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationScope::CharacterProfile => "character_profile",
            GenerationScope::CharacterScene => "character_scene",
            GenerationScope::Environment => "environment",
            GenerationScope::ActionSequence => "action_sequence",
            GenerationScope::DialogueScene => "dialogue_scene",
            GenerationScope::FullEpisode => "full_episode",
            GenerationScope::BatchGeneration => "batch_generation",
        }
    }
}

/// Visual style preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreference {
    PhotorealisticAnime,
    TraditionalAnime,
    Cartoon,
    Artistic,
    Chibi,
    Cinematic,
    Sketch,
}

impl StylePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            StylePreference::PhotorealisticAnime => "photorealistic_anime",
            StylePreference::TraditionalAnime => "traditional_anime",
            StylePreference::Cartoon => "cartoon",
            StylePreference::Artistic => "artistic",
            StylePreference::Chibi => "chibi",
            StylePreference::Cinematic => "cinematic",
            StylePreference::Sketch => "sketch",
        }
    }
}

/// Timeline / priority classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Immediate,
    Urgent,
    Standard,
    Scheduled,
    BatchProcessing,
}

/// Technical complexity assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    Expert,
}

// ============================================================================
// IntentClassification
// ============================================================================

/// The typed plan derived from a free-text request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub request_id: RequestId,
    pub content_type: ContentType,
    pub generation_scope: GenerationScope,
    pub style_preference: StylePreference,
    pub urgency_level: UrgencyLevel,
    pub complexity_level: ComplexityLevel,

    #[serde(default)]
    pub character_names: Vec<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// `duration_seconds * 24` for video requests.
    #[serde(default)]
    pub frame_count: Option<u32>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,

    pub quality_level: String,
    #[serde(default)]
    pub post_processing: Vec<String>,
    pub output_format: String,

    pub target_service: String,
    pub target_workflow: String,
    pub estimated_time_minutes: f64,
    pub estimated_vram_gb: f64,

    pub user_prompt: String,
    pub processed_prompt: String,
    /// Classifier confidence in [0, 1].
    pub confidence_score: f64,
    #[serde(default)]
    pub ambiguity_flags: Vec<String>,
    #[serde(default)]
    pub fallback_options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One character entity surfaced by contextual analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterEntity {
    pub name: String,
    #[serde(default)]
    pub physical_description: Option<String>,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub context_clues: Vec<String>,
}

/// Result of `perform_contextual_analysis`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextualAnalysis {
    pub intent_confidence: f64,
    #[serde(default)]
    pub semantic_categories: Vec<String>,
    #[serde(default)]
    pub character_entities: Vec<CharacterEntity>,
    #[serde(default)]
    pub scene_elements: Vec<String>,
    #[serde(default)]
    pub artistic_style_indicators: Vec<String>,
    #[serde(default)]
    pub temporal_indicators: Vec<String>,
    #[serde(default)]
    pub quality_indicators: Vec<String>,
    #[serde(default)]
    pub complexity_markers: Vec<String>,
    #[serde(default)]
    pub ambiguity_points: Vec<String>,
    #[serde(default)]
    pub suggested_clarifications: Vec<String>,
}

// ============================================================================
// Ambiguities
// ============================================================================

/// Kinds of detectable ambiguity in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityType {
    ContentTypeUnclear,
    ScopeAmbiguous,
    StyleConflicting,
    CharacterUndefined,
    DurationMissing,
    QualityVague,
    UrgencyUnclear,
    TechnicalIncomplete,
    ContradictoryRequirements,
    InsufficientDetail,
}

impl AmbiguityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguityType::ContentTypeUnclear => "content_type_unclear",
            AmbiguityType::ScopeAmbiguous => "scope_ambiguous",
            AmbiguityType::StyleConflicting => "style_conflicting",
            AmbiguityType::CharacterUndefined => "character_undefined",
            AmbiguityType::DurationMissing => "duration_missing",
            AmbiguityType::QualityVague => "quality_vague",
            AmbiguityType::UrgencyUnclear => "urgency_unclear",
            AmbiguityType::TechnicalIncomplete => "technical_incomplete",
            AmbiguityType::ContradictoryRequirements => "contradictory_requirements",
            AmbiguityType::InsufficientDetail => "insufficient_detail",
        }
    }

    /// Fields of the classification this ambiguity bears on.
    pub fn affected_fields(&self) -> &'static [&'static str] {
        match self {
            AmbiguityType::ContentTypeUnclear => &["content_type", "target_workflow"],
            AmbiguityType::ScopeAmbiguous => &["generation_scope"],
            AmbiguityType::StyleConflicting => &["style_preference"],
            AmbiguityType::CharacterUndefined => &["character_names"],
            AmbiguityType::DurationMissing => &["duration_seconds", "frame_count"],
            AmbiguityType::QualityVague => &["quality_level"],
            AmbiguityType::UrgencyUnclear => &["urgency_level"],
            AmbiguityType::TechnicalIncomplete => &["resolution", "output_format"],
            AmbiguityType::ContradictoryRequirements => &["content_type", "style_preference"],
            AmbiguityType::InsufficientDetail => &["processed_prompt"],
        }
    }
}

impl fmt::Display for AmbiguityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguitySeverity {
    Low,
    Medium,
    High,
}

/// One detected issue on a request. A `blocking` ambiguity prevents
/// execution until resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityDetection {
    pub ambiguity_type: AmbiguityType,
    pub confidence: f64,
    pub description: String,
    pub affected_fields: Vec<String>,
    pub evidence: Vec<String>,
    pub severity: AmbiguitySeverity,
    pub blocking: bool,
    #[serde(default)]
    pub context_clues: HashMap<String, String>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Strategies for resolving one ambiguity, tried in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    UserClarification,
    IntelligentDefault,
    ContextInference,
    TemplateSuggestion,
    ProgressiveRefinement,
    FallbackWorkflow,
    HybridApproach,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::UserClarification => "user_clarification",
            ResolutionStrategy::IntelligentDefault => "intelligent_default",
            ResolutionStrategy::ContextInference => "context_inference",
            ResolutionStrategy::TemplateSuggestion => "template_suggestion",
            ResolutionStrategy::ProgressiveRefinement => "progressive_refinement",
            ResolutionStrategy::FallbackWorkflow => "fallback_workflow",
            ResolutionStrategy::HybridApproach => "hybrid_approach",
        }
    }
}

/// A question put to the user to resolve a blocking ambiguity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub default_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_pattern: Option<String>,
    pub timeout_seconds: u64,
    pub priority: u8,
}

/// A multi-step refinement plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementPlan {
    pub initial_question: String,
    pub follow_up_questions: Vec<String>,
    pub expected_iterations: u8,
}

/// The polymorphic outcome of a resolution strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedValue {
    /// A concrete value the pipeline can use directly.
    Literal { value: serde_json::Value },
    /// A question that must go back to the user.
    Question { question: ClarificationQuestion },
    /// A suggested template with its match score.
    Template {
        name: String,
        description: String,
        score: f64,
    },
    /// A progressive-refinement plan.
    Plan { plan: RefinementPlan },
}

/// Outcome of resolving one ambiguity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub ambiguity_type: AmbiguityType,
    pub strategy: ResolutionStrategy,
    pub resolved_value: ResolvedValue,
    pub confidence: f64,
    pub user_interaction_required: bool,
}

/// Aggregate output of the ambiguity orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub has_ambiguities: bool,
    pub ambiguities: Vec<AmbiguityDetection>,
    pub resolutions: Vec<ResolutionResult>,
    pub requires_user_interaction: bool,
    /// Interaction-weighted mean of per-resolution confidences.
    pub confidence: f64,
    pub blocking_issues: Vec<AmbiguityType>,
}

/// Error when parsing one of the intent enums from a string.
#[derive(Debug, Error, Clone)]
#[error("invalid intent value: {0}")]
pub struct IntentParseError(String);

macro_rules! impl_from_str {
    ($ty:ident, { $($text:expr => $variant:expr),+ $(,)? }) => {
        impl std::str::FromStr for $ty {
            type Err = IntentParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    _ => Err(IntentParseError(s.to_string())),
                }
            }
        }
    };
}

impl_from_str!(ContentType, {
    "image" => ContentType::Image,
    "video" => ContentType::Video,
    "audio" => ContentType::Audio,
    "mixed_media" => ContentType::MixedMedia,
});

impl_from_str!(GenerationScope, {
    "character_profile" => GenerationScope::CharacterProfile,
    "character_scene" => GenerationScope::CharacterScene,
    "environment" => GenerationScope::Environment,
    "action_sequence" => GenerationScope::ActionSequence,
    "dialogue_scene" => GenerationScope::DialogueScene,
    "full_episode" => GenerationScope::FullEpisode,
    "batch_generation" => GenerationScope::BatchGeneration,
});

impl_from_str!(StylePreference, {
    "photorealistic_anime" => StylePreference::PhotorealisticAnime,
    "traditional_anime" => StylePreference::TraditionalAnime,
    "cartoon" => StylePreference::Cartoon,
    "artistic" => StylePreference::Artistic,
    "chibi" => StylePreference::Chibi,
    "cinematic" => StylePreference::Cinematic,
    "sketch" => StylePreference::Sketch,
});

impl_from_str!(UrgencyLevel, {
    "immediate" => UrgencyLevel::Immediate,
    "urgent" => UrgencyLevel::Urgent,
    "standard" => UrgencyLevel::Standard,
    "scheduled" => UrgencyLevel::Scheduled,
    "batch_processing" => UrgencyLevel::BatchProcessing,
});

impl_from_str!(ComplexityLevel, {
    "simple" => ComplexityLevel::Simple,
    "moderate" => ComplexityLevel::Moderate,
    "complex" => ComplexityLevel::Complex,
    "expert" => ComplexityLevel::Expert,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContentType::MixedMedia).unwrap(),
            "\"mixed_media\""
        );
        assert_eq!(
            serde_json::to_string(&GenerationScope::ActionSequence).unwrap(),
            "\"action_sequence\""
        );
        assert_eq!(
            serde_json::to_string(&AmbiguityType::DurationMissing).unwrap(),
            "\"duration_missing\""
        );
    }

    #[test]
    fn test_content_type_parse() {
        let ct: ContentType = "video".parse().unwrap();
        assert_eq!(ct, ContentType::Video);
        assert!("moving_picture".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AmbiguitySeverity::Low < AmbiguitySeverity::Medium);
        assert!(AmbiguitySeverity::Medium < AmbiguitySeverity::High);
    }

    #[test]
    fn test_resolved_value_tagging() {
        let value = ResolvedValue::Literal {
            value: serde_json::json!(15),
        };
        let encoded = serde_json::to_value(&value).unwrap();
        assert_eq!(encoded["kind"], "literal");
        assert_eq!(encoded["value"], 15);
    }
}
