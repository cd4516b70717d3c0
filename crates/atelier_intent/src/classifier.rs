//! Intent classifier - pattern pass merged with the LLM collaborator.
//!
//! Merge order per field: LLM wins when present and parseable, then the
//! pattern match, then the stored user preference, then the global default.
//! Any failure along the way degrades to a usable fallback classification
//! instead of an error.

use crate::patterns::PatternMatcher;
use atelier_echo::{extract_json, EchoClient, EchoQuery};
use atelier_protocol::intent::{
    ComplexityLevel, ContentType, GenerationScope, IntentClassification, StylePreference,
    UrgencyLevel,
};
use atelier_protocol::RequestId;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Wall-clock bound for the intent LLM call.
pub const INTENT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Confidence when only patterns matched.
const PATTERN_CONFIDENCE: f64 = 0.7;
/// Confidence when nothing matched at all.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Per-user defaults consulted after the LLM and pattern passes.
#[derive(Debug, Clone)]
pub struct UserPreferences {
    pub style: StylePreference,
    pub quality_level: String,
    pub default_duration_secs: u32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            style: StylePreference::TraditionalAnime,
            quality_level: "standard".to_string(),
            default_duration_secs: 15,
        }
    }
}

/// What the deterministic pass extracted.
#[derive(Debug, Clone, Default)]
struct PatternPass {
    content_type: Option<ContentType>,
    scope: Option<GenerationScope>,
    style: Option<StylePreference>,
    urgency: Option<UrgencyLevel>,
    character_names: Vec<String>,
    duration_seconds: Option<u32>,
    any_match: bool,
}

/// Intent classifier (C5).
pub struct IntentClassifier {
    patterns: PatternMatcher,
    echo: Option<EchoClient>,
    preferences: HashMap<String, UserPreferences>,
}

impl IntentClassifier {
    pub fn new(echo: Option<EchoClient>) -> Self {
        Self {
            patterns: PatternMatcher::new(),
            echo,
            preferences: HashMap::new(),
        }
    }

    pub fn with_preferences(mut self, user_id: impl Into<String>, prefs: UserPreferences) -> Self {
        self.preferences.insert(user_id.into(), prefs);
        self
    }

    pub fn patterns(&self) -> &PatternMatcher {
        &self.patterns
    }

    /// Classify free text into a typed plan. Never errors: LLM failures
    /// degrade to the pattern pass, and a fully failed classification
    /// becomes the guided-workflow fallback.
    pub async fn classify(&self, user_prompt: &str, user_id: &str) -> IntentClassification {
        let prompt = user_prompt.trim();
        if prompt.is_empty() {
            return self.fallback_classification(user_prompt);
        }

        let pattern_pass = self.pattern_pass(prompt);
        let llm_value = self.ask_llm(prompt).await;

        self.merge(prompt, user_id, pattern_pass, llm_value)
    }

    fn pattern_pass(&self, prompt: &str) -> PatternPass {
        let content_types = self.patterns.content_types(prompt);
        let scopes = self.patterns.scopes(prompt);
        let styles = self.patterns.styles(prompt);
        let urgencies = self.patterns.urgencies(prompt);
        let character_names = self.patterns.character_names(prompt);
        let duration_seconds = self.patterns.duration_seconds(prompt);

        let any_match = !content_types.is_empty()
            || !scopes.is_empty()
            || !styles.is_empty()
            || !urgencies.is_empty()
            || !character_names.is_empty()
            || duration_seconds.is_some();

        PatternPass {
            content_type: content_types.first().copied(),
            scope: scopes.first().copied(),
            style: styles.first().copied(),
            urgency: urgencies.first().copied(),
            character_names,
            duration_seconds,
            any_match,
        }
    }

    async fn ask_llm(&self, prompt: &str) -> Option<Value> {
        let echo = self.echo.as_ref()?;
        let query = EchoQuery::new(
            format!(
                "Classify this generation request into JSON with keys \
                 content_type (image|video|audio|mixed_media), \
                 generation_scope (character_profile|character_scene|environment|\
                 action_sequence|dialogue_scene|full_episode|batch_generation), \
                 style_preference (photorealistic_anime|traditional_anime|cartoon|\
                 artistic|chibi|cinematic|sketch), \
                 urgency_level (immediate|urgent|standard|scheduled|batch_processing), \
                 character_names (array of strings), duration_seconds (int or null), \
                 quality_level (draft|standard|high|maximum), \
                 confidence (0.0-1.0). \
                 Answer with JSON only.\n\nRequest: {prompt}"
            ),
            "intent-classifier",
        );

        match echo.query(&query, INTENT_LLM_TIMEOUT).await {
            Ok(response) => {
                let value = extract_json(&response.response);
                if value.is_none() {
                    debug!("Echo answer had no parseable JSON, falling back to patterns");
                }
                value
            }
            Err(e) => {
                warn!("Intent LLM call failed: {}", e);
                None
            }
        }
    }

    fn merge(
        &self,
        prompt: &str,
        user_id: &str,
        patterns: PatternPass,
        llm: Option<Value>,
    ) -> IntentClassification {
        let prefs = self
            .preferences
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        let llm = llm.unwrap_or(Value::Null);

        let content_type = llm_enum::<ContentType>(&llm, "content_type")
            .or(patterns.content_type)
            .unwrap_or(ContentType::Image);
        let generation_scope = llm_enum::<GenerationScope>(&llm, "generation_scope")
            .or(patterns.scope)
            .unwrap_or(GenerationScope::CharacterProfile);
        let style_preference = llm_enum::<StylePreference>(&llm, "style_preference")
            .or(patterns.style)
            .unwrap_or(prefs.style);
        let urgency_level = llm_enum::<UrgencyLevel>(&llm, "urgency_level")
            .or(patterns.urgency)
            .unwrap_or(UrgencyLevel::Standard);

        let mut character_names: Vec<String> = llm
            .get("character_names")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if character_names.is_empty() {
            character_names = patterns.character_names.clone();
        }

        let duration_seconds = llm
            .get("duration_seconds")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .or(patterns.duration_seconds);

        let quality_level = llm
            .get("quality_level")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(prefs.quality_level);

        let confidence_score = match llm.get("confidence").and_then(|v| v.as_f64()) {
            Some(confidence) => confidence.clamp(0.0, 1.0),
            None if patterns.any_match => PATTERN_CONFIDENCE,
            None => FALLBACK_CONFIDENCE,
        };

        let frame_count = match content_type {
            ContentType::Video => duration_seconds.map(|d| d * 24),
            _ => None,
        };

        let complexity_level = derive_complexity(generation_scope, content_type, duration_seconds);
        let (target_workflow, output_format) = routing_for(content_type);
        let estimated_time_minutes =
            estimate_minutes(content_type, generation_scope, duration_seconds);
        let estimated_vram_gb = match content_type {
            ContentType::Video => 10.0,
            _ => 6.0,
        };

        IntentClassification {
            request_id: RequestId::new(),
            content_type,
            generation_scope,
            style_preference,
            urgency_level,
            complexity_level,
            character_names,
            duration_seconds,
            frame_count,
            resolution: None,
            aspect_ratio: None,
            quality_level,
            post_processing: Vec::new(),
            output_format: output_format.to_string(),
            target_service: "comfyui".to_string(),
            target_workflow: target_workflow.to_string(),
            estimated_time_minutes,
            estimated_vram_gb,
            user_prompt: prompt.to_string(),
            processed_prompt: prompt.to_string(),
            confidence_score,
            ambiguity_flags: Vec::new(),
            fallback_options: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The classification returned when everything else failed.
    pub fn fallback_classification(&self, user_prompt: &str) -> IntentClassification {
        IntentClassification {
            request_id: RequestId::new(),
            content_type: ContentType::Image,
            generation_scope: GenerationScope::CharacterProfile,
            style_preference: StylePreference::TraditionalAnime,
            urgency_level: UrgencyLevel::Standard,
            complexity_level: ComplexityLevel::Simple,
            character_names: Vec::new(),
            duration_seconds: None,
            frame_count: None,
            resolution: None,
            aspect_ratio: None,
            quality_level: "standard".to_string(),
            post_processing: Vec::new(),
            output_format: "png".to_string(),
            target_service: "comfyui".to_string(),
            target_workflow: "image_generation".to_string(),
            estimated_time_minutes: 1.0,
            estimated_vram_gb: 6.0,
            user_prompt: user_prompt.to_string(),
            processed_prompt: user_prompt.trim().to_string(),
            confidence_score: FALLBACK_CONFIDENCE,
            ambiguity_flags: vec!["classification_failed".to_string()],
            fallback_options: vec![
                "guided_workflow".to_string(),
                "manual_selection".to_string(),
            ],
            created_at: Utc::now(),
        }
    }
}

fn llm_enum<T: FromStr + Copy>(llm: &Value, key: &str) -> Option<T> {
    llm.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| T::from_str(s).ok())
}

fn derive_complexity(
    scope: GenerationScope,
    content_type: ContentType,
    duration: Option<u32>,
) -> ComplexityLevel {
    match scope {
        GenerationScope::FullEpisode => ComplexityLevel::Expert,
        GenerationScope::ActionSequence => ComplexityLevel::Complex,
        _ if duration.is_some_and(|d| d > 30) => ComplexityLevel::Complex,
        _ if content_type == ContentType::Video => ComplexityLevel::Moderate,
        _ => ComplexityLevel::Simple,
    }
}

fn routing_for(content_type: ContentType) -> (&'static str, &'static str) {
    match content_type {
        ContentType::Image => ("image_generation", "png"),
        ContentType::Video => ("animatediff_video", "mp4"),
        ContentType::Audio => ("voice_synthesis", "wav"),
        ContentType::MixedMedia => ("mixed_media", "mp4"),
    }
}

fn estimate_minutes(
    content_type: ContentType,
    scope: GenerationScope,
    duration: Option<u32>,
) -> f64 {
    match (content_type, scope) {
        (_, GenerationScope::FullEpisode) => 30.0,
        (ContentType::Video, _) => 2.0 + duration.unwrap_or(15) as f64 / 10.0,
        (ContentType::Image, GenerationScope::BatchGeneration) => 5.0,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(None)
    }

    #[tokio::test]
    async fn test_pattern_only_classification() {
        let classification = classifier()
            .classify("Generate a 10 second video of Kai fighting", "user-1")
            .await;
        assert_eq!(classification.content_type, ContentType::Video);
        assert_eq!(classification.duration_seconds, Some(10));
        assert_eq!(classification.frame_count, Some(240));
        assert_eq!(classification.character_names, vec!["Kai"]);
        assert!((classification.confidence_score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_match_low_confidence() {
        let classification = classifier().classify("zzzz qqqq", "user-1").await;
        assert!((classification.confidence_score - 0.3).abs() < 1e-9);
        assert_eq!(classification.content_type, ContentType::Image);
    }

    #[tokio::test]
    async fn test_empty_prompt_falls_back() {
        let classification = classifier().classify("   ", "user-1").await;
        assert!(classification
            .ambiguity_flags
            .contains(&"classification_failed".to_string()));
        assert_eq!(
            classification.fallback_options,
            vec!["guided_workflow", "manual_selection"]
        );
    }

    #[test]
    fn test_llm_merge_wins_over_patterns() {
        let classifier = classifier();
        let patterns = PatternPass {
            content_type: Some(ContentType::Image),
            any_match: true,
            ..Default::default()
        };
        let llm = serde_json::json!({
            "content_type": "video",
            "duration_seconds": 20,
            "confidence": 0.92,
        });
        let merged = classifier.merge("make something", "user-1", patterns, Some(llm));
        assert_eq!(merged.content_type, ContentType::Video);
        assert_eq!(merged.duration_seconds, Some(20));
        assert_eq!(merged.frame_count, Some(480));
        assert!((merged.confidence_score - 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_llm_field_falls_through() {
        let classifier = classifier();
        let patterns = PatternPass {
            content_type: Some(ContentType::Image),
            any_match: true,
            ..Default::default()
        };
        let llm = serde_json::json!({ "content_type": "hologram" });
        let merged = classifier.merge("a portrait", "user-1", patterns, Some(llm));
        assert_eq!(merged.content_type, ContentType::Image);
    }

    #[test]
    fn test_complexity_derivation() {
        assert_eq!(
            derive_complexity(GenerationScope::FullEpisode, ContentType::Video, None),
            ComplexityLevel::Expert
        );
        assert_eq!(
            derive_complexity(GenerationScope::CharacterScene, ContentType::Video, Some(45)),
            ComplexityLevel::Complex
        );
        assert_eq!(
            derive_complexity(GenerationScope::CharacterProfile, ContentType::Image, None),
            ComplexityLevel::Simple
        );
    }
}
