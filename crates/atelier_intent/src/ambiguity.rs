//! Ambiguity detection (C6, detection half).
//!
//! Text rules run over the raw prompt; classification rules look at what
//! the classifier produced. Each detection carries evidence, a severity,
//! and whether it blocks execution.

use crate::patterns::PatternMatcher;
use atelier_protocol::intent::{
    AmbiguityDetection, AmbiguitySeverity, AmbiguityType, ContentType, IntentClassification,
    StylePreference,
};
use regex::Regex;
use std::collections::HashMap;

/// Classification confidence below this raises an ambiguity.
pub const LOW_CONFIDENCE: f64 = 0.7;
/// Below this the ambiguity blocks execution.
pub const BLOCKING_CONFIDENCE: f64 = 0.4;

struct TextRule {
    ambiguity_type: AmbiguityType,
    pattern: Regex,
    evidence: &'static str,
    severity: AmbiguitySeverity,
    blocking: bool,
}

/// Style pairs that cannot be rendered together.
const CONFLICTING_STYLES: &[(StylePreference, StylePreference)] = &[
    (StylePreference::PhotorealisticAnime, StylePreference::Cartoon),
    (StylePreference::TraditionalAnime, StylePreference::Cartoon),
    (StylePreference::PhotorealisticAnime, StylePreference::Sketch),
    (StylePreference::Chibi, StylePreference::Cinematic),
];

pub struct AmbiguityDetector {
    text_rules: Vec<TextRule>,
}

impl AmbiguityDetector {
    pub fn new() -> Self {
        let rule = |ambiguity_type,
                    pattern: &str,
                    evidence,
                    severity,
                    blocking| TextRule {
            ambiguity_type,
            pattern: Regex::new(pattern).expect("detection rules are static"),
            evidence,
            severity,
            blocking,
        };

        Self {
            text_rules: vec![
                rule(
                    AmbiguityType::CharacterUndefined,
                    r"\b(the character|that person|them|him|her)\b",
                    "pronoun or placeholder with no named character",
                    AmbiguitySeverity::Medium,
                    false,
                ),
                rule(
                    AmbiguityType::QualityVague,
                    r"\b(good|nice|better|decent|okay)\b",
                    "vague quality adjective",
                    AmbiguitySeverity::Low,
                    false,
                ),
                rule(
                    AmbiguityType::ContradictoryRequirements,
                    r"\b(fast|quick|rough).{0,30}\b(high quality|best|maximum|perfect)\b",
                    "speed and maximum quality requested together",
                    AmbiguitySeverity::Medium,
                    false,
                ),
                rule(
                    AmbiguityType::UrgencyUnclear,
                    r"\b(soonish|sometime|eventually|when you can)\b",
                    "soft deadline wording",
                    AmbiguitySeverity::Low,
                    false,
                ),
            ],
        }
    }

    /// Run every detection rule over the prompt and the classification.
    pub fn detect(
        &self,
        user_prompt: &str,
        classification: &IntentClassification,
        patterns: &PatternMatcher,
    ) -> Vec<AmbiguityDetection> {
        let mut detections = Vec::new();
        let lower = user_prompt.to_lowercase();

        // Both content families named in one request.
        let content_matches = patterns.content_types(user_prompt);
        if content_matches.contains(&ContentType::Image)
            && content_matches.contains(&ContentType::Video)
        {
            detections.push(make_detection(
                AmbiguityType::ContentTypeUnclear,
                0.9,
                "request names both image and video output",
                vec!["image".to_string(), "video".to_string()],
                AmbiguitySeverity::High,
                true,
            ));
        }

        // Irreconcilable style words.
        let style_matches = patterns.styles(user_prompt);
        for (a, b) in CONFLICTING_STYLES {
            if style_matches.contains(a) && style_matches.contains(b) {
                detections.push(make_detection(
                    AmbiguityType::StyleConflicting,
                    0.85,
                    "conflicting style families requested",
                    vec![a.as_str().to_string(), b.as_str().to_string()],
                    AmbiguitySeverity::High,
                    true,
                ));
                break;
            }
        }

        for rule in &self.text_rules {
            if rule.pattern.is_match(&lower) {
                // The pronoun rule only fires when no name was recognized.
                if rule.ambiguity_type == AmbiguityType::CharacterUndefined
                    && !classification.character_names.is_empty()
                {
                    continue;
                }
                detections.push(make_detection(
                    rule.ambiguity_type,
                    pattern_confidence(&rule.pattern, &lower),
                    rule.evidence,
                    vec![rule.evidence.to_string()],
                    rule.severity,
                    rule.blocking,
                ));
            }
        }

        // Classification-level checks.
        if classification.content_type == ContentType::Video
            && classification.duration_seconds.is_none()
        {
            detections.push(make_detection(
                AmbiguityType::DurationMissing,
                0.8,
                "video requested without a duration",
                vec!["no duration found in prompt".to_string()],
                AmbiguitySeverity::Medium,
                false,
            ));
        }

        if classification.confidence_score < LOW_CONFIDENCE {
            let blocking = classification.confidence_score < BLOCKING_CONFIDENCE;
            detections.push(make_detection(
                AmbiguityType::InsufficientDetail,
                0.8,
                "classifier confidence below threshold",
                vec![format!(
                    "confidence {:.2} < {LOW_CONFIDENCE}",
                    classification.confidence_score
                )],
                if blocking {
                    AmbiguitySeverity::High
                } else {
                    AmbiguitySeverity::Medium
                },
                blocking,
            ));
        }

        dedupe(detections)
    }
}

impl Default for AmbiguityDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn make_detection(
    ambiguity_type: AmbiguityType,
    confidence: f64,
    description: &str,
    evidence: Vec<String>,
    severity: AmbiguitySeverity,
    blocking: bool,
) -> AmbiguityDetection {
    AmbiguityDetection {
        ambiguity_type,
        confidence,
        description: description.to_string(),
        affected_fields: ambiguity_type
            .affected_fields()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        evidence,
        severity,
        blocking,
        context_clues: HashMap::new(),
    }
}

/// More matches in a shorter prompt means a stronger signal.
fn pattern_confidence(pattern: &Regex, text: &str) -> f64 {
    let matches = pattern.find_iter(text).count() as f64;
    let base = (matches * 0.3).min(0.9);
    let words = text.split_whitespace().count() as f64;
    let length_factor = (1.0 - (words - 10.0).max(0.0) * 0.02).max(0.1);
    (base * length_factor).min(0.95)
}

/// One detection per type, keeping the most severe.
fn dedupe(mut detections: Vec<AmbiguityDetection>) -> Vec<AmbiguityDetection> {
    detections.sort_by(|a, b| {
        a.ambiguity_type
            .as_str()
            .cmp(b.ambiguity_type.as_str())
            .then(b.severity.cmp(&a.severity))
    });
    detections.dedup_by(|a, b| a.ambiguity_type == b.ambiguity_type);
    detections.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.blocking.cmp(&a.blocking)));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;

    async fn classify(prompt: &str) -> IntentClassification {
        IntentClassifier::new(None).classify(prompt, "user-1").await
    }

    #[tokio::test]
    async fn test_image_and_video_blocks() {
        let patterns = PatternMatcher::new();
        let detector = AmbiguityDetector::new();
        let prompt = "I want an image, or maybe a video, of the city";
        let classification = classify(prompt).await;
        let detections = detector.detect(prompt, &classification, &patterns);

        let content = detections
            .iter()
            .find(|d| d.ambiguity_type == AmbiguityType::ContentTypeUnclear)
            .expect("content type ambiguity detected");
        assert!(content.blocking);
        assert_eq!(content.severity, AmbiguitySeverity::High);
    }

    #[tokio::test]
    async fn test_video_without_duration_non_blocking() {
        let patterns = PatternMatcher::new();
        let detector = AmbiguityDetector::new();
        let prompt = "Create a video";
        let classification = classify(prompt).await;
        let detections = detector.detect(prompt, &classification, &patterns);

        let duration = detections
            .iter()
            .find(|d| d.ambiguity_type == AmbiguityType::DurationMissing)
            .expect("duration ambiguity detected");
        assert!(!duration.blocking);
    }

    #[tokio::test]
    async fn test_conflicting_styles_block() {
        let patterns = PatternMatcher::new();
        let detector = AmbiguityDetector::new();
        let prompt = "realistic anime cartoon hero";
        let classification = classify(prompt).await;
        let detections = detector.detect(prompt, &classification, &patterns);

        let style = detections
            .iter()
            .find(|d| d.ambiguity_type == AmbiguityType::StyleConflicting)
            .expect("style conflict detected");
        assert!(style.blocking);
    }

    #[tokio::test]
    async fn test_clean_prompt_passes() {
        let patterns = PatternMatcher::new();
        let detector = AmbiguityDetector::new();
        let prompt = "Generate a 10 second anime video of Kai fighting in the rain";
        let classification = classify(prompt).await;
        let detections = detector.detect(prompt, &classification, &patterns);
        assert!(detections.iter().all(|d| !d.blocking));
    }
}
