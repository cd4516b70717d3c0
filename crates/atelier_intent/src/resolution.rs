//! Ambiguity resolution (C6, resolution half).
//!
//! Each ambiguity type has a chain of strategies tried in priority order
//! until one produces a result. A resolution that needs the user sets
//! `user_interaction_required` and weighs less in the aggregate confidence.

use atelier_protocol::intent::{
    AmbiguityDetection, AmbiguityType, ClarificationQuestion, IntentClassification,
    RefinementPlan, ResolutionReport, ResolutionResult, ResolutionStrategy, ResolvedValue,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Confidence attached to a clarification question (the user's answer is
/// authoritative).
const CLARIFICATION_CONFIDENCE: f64 = 0.9;
/// Confidence of a context-inference rule hit.
const INFERENCE_CONFIDENCE: f64 = 0.75;
/// Confidence of a last-resort fallback value.
const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Weight of a resolution that requires user interaction.
const INTERACTION_WEIGHT: f64 = 0.8;

/// Default duration handed out when a video request has none.
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 15;

/// Free-form request context consulted by inference and templates.
pub type ResolutionContext = HashMap<String, String>;

/// A template offered when the request is too thin to plan from.
#[derive(Debug, Clone)]
struct Template {
    name: &'static str,
    description: &'static str,
    keywords: &'static [&'static str],
}

const TEMPLATES: &[Template] = &[
    Template {
        name: "character_portrait",
        description: "Single character, waist-up portrait, neutral backdrop",
        keywords: &["character", "portrait", "profile", "face"],
    },
    Template {
        name: "action_clip",
        description: "Short action clip, 10-15 seconds, dynamic camera",
        keywords: &["action", "fight", "battle", "chase"],
    },
    Template {
        name: "establishing_shot",
        description: "Environment-only establishing shot, no characters",
        keywords: &["background", "environment", "landscape", "city"],
    },
];

/// Inference rules: `condition -> outcome`. The first rule whose condition
/// key is present (and truthy) in the context wins.
const INFERENCE_RULES: &[(AmbiguityType, &[&str])] = &[
    (
        AmbiguityType::ContentTypeUnclear,
        &[
            "has_motion_words -> video",
            "has_portrait_words -> image",
        ],
    ),
    (
        AmbiguityType::ScopeAmbiguous,
        &[
            "has_character_names -> character_scene",
            "has_location_words -> environment",
        ],
    ),
];

pub struct ResolutionEngine;

impl ResolutionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Strategy chain per ambiguity type, in priority order.
    fn strategies(ambiguity_type: AmbiguityType) -> &'static [ResolutionStrategy] {
        use ResolutionStrategy::*;
        match ambiguity_type {
            AmbiguityType::ContentTypeUnclear => &[UserClarification, ContextInference, FallbackWorkflow],
            AmbiguityType::ScopeAmbiguous => &[ContextInference, UserClarification, FallbackWorkflow],
            AmbiguityType::StyleConflicting => &[UserClarification, FallbackWorkflow],
            AmbiguityType::CharacterUndefined => &[UserClarification, TemplateSuggestion, FallbackWorkflow],
            AmbiguityType::DurationMissing => &[IntelligentDefault, UserClarification, FallbackWorkflow],
            AmbiguityType::QualityVague => &[IntelligentDefault, FallbackWorkflow],
            AmbiguityType::UrgencyUnclear => &[IntelligentDefault, FallbackWorkflow],
            AmbiguityType::TechnicalIncomplete => &[IntelligentDefault, TemplateSuggestion, FallbackWorkflow],
            AmbiguityType::ContradictoryRequirements => &[UserClarification, ProgressiveRefinement, FallbackWorkflow],
            AmbiguityType::InsufficientDetail => &[ProgressiveRefinement, UserClarification, FallbackWorkflow],
        }
    }

    /// Resolve one ambiguity by walking its strategy chain.
    pub fn resolve(
        &self,
        ambiguity: &AmbiguityDetection,
        context: &ResolutionContext,
    ) -> ResolutionResult {
        for strategy in Self::strategies(ambiguity.ambiguity_type) {
            if let Some(result) = self.try_strategy(*strategy, ambiguity, context) {
                debug!(
                    "Resolved {} via {}",
                    ambiguity.ambiguity_type.as_str(),
                    strategy.as_str()
                );
                return result;
            }
        }
        // The chains all end in FallbackWorkflow, which never declines.
        self.fallback(ambiguity)
    }

    fn try_strategy(
        &self,
        strategy: ResolutionStrategy,
        ambiguity: &AmbiguityDetection,
        context: &ResolutionContext,
    ) -> Option<ResolutionResult> {
        match strategy {
            ResolutionStrategy::UserClarification => Some(self.clarify(ambiguity)),
            ResolutionStrategy::IntelligentDefault => self.intelligent_default(ambiguity, context),
            ResolutionStrategy::ContextInference => self.infer(ambiguity, context),
            ResolutionStrategy::TemplateSuggestion => self.suggest_template(ambiguity, context),
            ResolutionStrategy::ProgressiveRefinement => Some(self.refine(ambiguity)),
            ResolutionStrategy::FallbackWorkflow => Some(self.fallback(ambiguity)),
            ResolutionStrategy::HybridApproach => None,
        }
    }

    fn clarify(&self, ambiguity: &AmbiguityDetection) -> ResolutionResult {
        let (question, options, default_answer): (&str, Vec<&str>, &str) =
            match ambiguity.ambiguity_type {
                AmbiguityType::ContentTypeUnclear => (
                    "Should this be a still image or an animated video?",
                    vec!["image", "video"],
                    "image",
                ),
                AmbiguityType::StyleConflicting => (
                    "Those styles clash. Which one should win?",
                    vec!["traditional_anime", "photorealistic_anime", "cartoon"],
                    "traditional_anime",
                ),
                AmbiguityType::CharacterUndefined => (
                    "Which character is this about?",
                    vec![],
                    "",
                ),
                AmbiguityType::DurationMissing => (
                    "How long should the video be, in seconds?",
                    vec!["5", "15", "30"],
                    "15",
                ),
                AmbiguityType::ScopeAmbiguous => (
                    "Is this a character shot or an environment shot?",
                    vec!["character_scene", "environment"],
                    "character_scene",
                ),
                AmbiguityType::ContradictoryRequirements => (
                    "Which matters more here, speed or quality?",
                    vec!["speed", "quality"],
                    "quality",
                ),
                _ => (
                    "Could you add more detail to the request?",
                    vec![],
                    "",
                ),
            };

        ResolutionResult {
            ambiguity_type: ambiguity.ambiguity_type,
            strategy: ResolutionStrategy::UserClarification,
            resolved_value: ResolvedValue::Question {
                question: ClarificationQuestion {
                    question: question.to_string(),
                    options: options.into_iter().map(String::from).collect(),
                    default_answer: default_answer.to_string(),
                    validation_pattern: match ambiguity.ambiguity_type {
                        AmbiguityType::DurationMissing => Some(r"^\d{1,3}$".to_string()),
                        _ => None,
                    },
                    timeout_seconds: 300,
                    priority: if ambiguity.blocking { 1 } else { 3 },
                },
            },
            confidence: CLARIFICATION_CONFIDENCE,
            user_interaction_required: true,
        }
    }

    /// Context-aware default; declines below the per-type threshold.
    fn intelligent_default(
        &self,
        ambiguity: &AmbiguityDetection,
        context: &ResolutionContext,
    ) -> Option<ResolutionResult> {
        let (value, confidence, threshold) = match ambiguity.ambiguity_type {
            AmbiguityType::DurationMissing => {
                // Action requests read better short.
                let duration = if context.get("scene_type").is_some_and(|s| s == "action") {
                    10
                } else {
                    DEFAULT_VIDEO_DURATION_SECS
                };
                (json!(duration), 0.8, 0.6)
            }
            AmbiguityType::QualityVague => (json!("standard"), 0.8, 0.6),
            AmbiguityType::UrgencyUnclear => (json!("standard"), 0.9, 0.6),
            AmbiguityType::TechnicalIncomplete => (json!("512x768"), 0.7, 0.8),
            _ => return None,
        };

        if confidence < threshold {
            return None;
        }
        Some(ResolutionResult {
            ambiguity_type: ambiguity.ambiguity_type,
            strategy: ResolutionStrategy::IntelligentDefault,
            resolved_value: ResolvedValue::Literal { value },
            confidence,
            user_interaction_required: false,
        })
    }

    fn infer(
        &self,
        ambiguity: &AmbiguityDetection,
        context: &ResolutionContext,
    ) -> Option<ResolutionResult> {
        let rules = INFERENCE_RULES
            .iter()
            .find(|(t, _)| *t == ambiguity.ambiguity_type)
            .map(|(_, rules)| *rules)?;

        for rule in rules {
            let (condition, outcome) = rule.split_once(" -> ")?;
            if context.get(condition).is_some_and(|v| v == "true") {
                return Some(ResolutionResult {
                    ambiguity_type: ambiguity.ambiguity_type,
                    strategy: ResolutionStrategy::ContextInference,
                    resolved_value: ResolvedValue::Literal {
                        value: json!(outcome),
                    },
                    confidence: INFERENCE_CONFIDENCE,
                    user_interaction_required: false,
                });
            }
        }
        None
    }

    /// Score templates by keyword overlap with the context; best match wins.
    fn suggest_template(
        &self,
        ambiguity: &AmbiguityDetection,
        context: &ResolutionContext,
    ) -> Option<ResolutionResult> {
        let prompt = context.get("prompt").map(String::as_str).unwrap_or("");
        let lower = prompt.to_lowercase();

        let (best, score) = TEMPLATES
            .iter()
            .map(|template| {
                let hits = template
                    .keywords
                    .iter()
                    .filter(|k| lower.contains(**k))
                    .count();
                (template, hits as f64 / template.keywords.len() as f64)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        if score <= 0.0 {
            return None;
        }
        Some(ResolutionResult {
            ambiguity_type: ambiguity.ambiguity_type,
            strategy: ResolutionStrategy::TemplateSuggestion,
            resolved_value: ResolvedValue::Template {
                name: best.name.to_string(),
                description: best.description.to_string(),
                score,
            },
            confidence: 0.6 + 0.3 * score,
            user_interaction_required: false,
        })
    }

    fn refine(&self, ambiguity: &AmbiguityDetection) -> ResolutionResult {
        ResolutionResult {
            ambiguity_type: ambiguity.ambiguity_type,
            strategy: ResolutionStrategy::ProgressiveRefinement,
            resolved_value: ResolvedValue::Plan {
                plan: RefinementPlan {
                    initial_question: "What is the main subject of this generation?".to_string(),
                    follow_up_questions: vec![
                        "Where does it take place?".to_string(),
                        "What style should it use?".to_string(),
                    ],
                    expected_iterations: 2,
                },
            },
            confidence: 0.7,
            user_interaction_required: true,
        }
    }

    /// Last resort: a typed default at low confidence.
    fn fallback(&self, ambiguity: &AmbiguityDetection) -> ResolutionResult {
        let value = match ambiguity.ambiguity_type {
            AmbiguityType::ContentTypeUnclear => json!("image"),
            AmbiguityType::ScopeAmbiguous => json!("character_profile"),
            AmbiguityType::StyleConflicting => json!("traditional_anime"),
            AmbiguityType::CharacterUndefined => json!(null),
            AmbiguityType::DurationMissing => json!(DEFAULT_VIDEO_DURATION_SECS),
            AmbiguityType::QualityVague => json!("standard"),
            AmbiguityType::UrgencyUnclear => json!("standard"),
            AmbiguityType::TechnicalIncomplete => json!("512x768"),
            AmbiguityType::ContradictoryRequirements => json!("quality"),
            AmbiguityType::InsufficientDetail => json!(null),
        };
        ResolutionResult {
            ambiguity_type: ambiguity.ambiguity_type,
            strategy: ResolutionStrategy::FallbackWorkflow,
            resolved_value: ResolvedValue::Literal { value },
            confidence: FALLBACK_CONFIDENCE,
            user_interaction_required: false,
        }
    }
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the resolution context consulted by inference and templates.
pub fn build_context(
    user_prompt: &str,
    classification: &IntentClassification,
) -> ResolutionContext {
    let lower = user_prompt.to_lowercase();
    let mut context = ResolutionContext::new();
    context.insert("prompt".to_string(), user_prompt.to_string());
    context.insert(
        "has_character_names".to_string(),
        (!classification.character_names.is_empty()).to_string(),
    );
    context.insert(
        "has_motion_words".to_string(),
        ["moving", "walking", "running", "animation", "motion"]
            .iter()
            .any(|w| lower.contains(w))
            .to_string(),
    );
    context.insert(
        "has_portrait_words".to_string(),
        ["portrait", "headshot", "profile picture"]
            .iter()
            .any(|w| lower.contains(w))
            .to_string(),
    );
    context.insert(
        "has_location_words".to_string(),
        ["city", "forest", "room", "landscape", "street"]
            .iter()
            .any(|w| lower.contains(w))
            .to_string(),
    );
    if let Some(scene_type) = classification
        .generation_scope
        .as_str()
        .strip_suffix("_sequence")
    {
        context.insert("scene_type".to_string(), scene_type.to_string());
    }
    context
}

/// The orchestrator: detect nothing here - it takes detections and turns
/// them into a report.
pub fn process(
    ambiguities: Vec<AmbiguityDetection>,
    engine: &ResolutionEngine,
    context: &ResolutionContext,
) -> ResolutionReport {
    let resolutions: Vec<ResolutionResult> = ambiguities
        .iter()
        .map(|ambiguity| engine.resolve(ambiguity, context))
        .collect();

    let requires_user_interaction = resolutions.iter().any(|r| r.user_interaction_required);
    let blocking_issues: Vec<AmbiguityType> = ambiguities
        .iter()
        .filter(|a| a.blocking)
        .map(|a| a.ambiguity_type)
        .collect();

    // Interaction-weighted mean of per-resolution confidences.
    let confidence = if resolutions.is_empty() {
        1.0
    } else {
        let (sum, weight_sum) = resolutions.iter().fold((0.0, 0.0), |(s, w), r| {
            let weight = if r.user_interaction_required {
                INTERACTION_WEIGHT
            } else {
                1.0
            };
            (s + r.confidence * weight, w + weight)
        });
        sum / weight_sum
    };

    ResolutionReport {
        has_ambiguities: !ambiguities.is_empty(),
        ambiguities,
        resolutions,
        requires_user_interaction,
        confidence,
        blocking_issues,
    }
}
