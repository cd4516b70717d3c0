//! Intent classification and ambiguity resolution.
//!
//! [`IntentPipeline`] is the front door: classify a prompt, detect
//! ambiguities, resolve what can be resolved, and report what needs the
//! user.

pub mod ambiguity;
pub mod analysis;
pub mod classifier;
pub mod patterns;
pub mod resolution;

pub use ambiguity::{AmbiguityDetector, BLOCKING_CONFIDENCE, LOW_CONFIDENCE};
pub use analysis::{heuristic_analysis, perform_contextual_analysis};
pub use classifier::{IntentClassifier, UserPreferences, INTENT_LLM_TIMEOUT};
pub use patterns::PatternMatcher;
pub use resolution::{
    build_context, process, ResolutionContext, ResolutionEngine, DEFAULT_VIDEO_DURATION_SECS,
};

use atelier_echo::EchoClient;
use atelier_protocol::intent::{ContextualAnalysis, IntentClassification, ResolutionReport};

/// Classifier + detector + resolver wired together.
pub struct IntentPipeline {
    classifier: IntentClassifier,
    detector: AmbiguityDetector,
    engine: ResolutionEngine,
    echo: Option<EchoClient>,
}

impl IntentPipeline {
    pub fn new(echo: Option<EchoClient>) -> Self {
        Self {
            classifier: IntentClassifier::new(echo.clone()),
            detector: AmbiguityDetector::new(),
            engine: ResolutionEngine::new(),
            echo,
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Classify a prompt into a typed plan.
    pub async fn classify(&self, user_prompt: &str, user_id: &str) -> IntentClassification {
        self.classifier.classify(user_prompt, user_id).await
    }

    /// Detect and resolve ambiguities for an already-classified request.
    pub fn process(
        &self,
        user_prompt: &str,
        classification: &IntentClassification,
    ) -> ResolutionReport {
        let ambiguities =
            self.detector
                .detect(user_prompt, classification, self.classifier.patterns());
        let context = build_context(user_prompt, classification);
        process(ambiguities, &self.engine, &context)
    }

    /// Structured contextual analysis of a prompt.
    pub async fn contextual_analysis(&self, user_prompt: &str) -> ContextualAnalysis {
        perform_contextual_analysis(self.echo.as_ref(), self.classifier.patterns(), user_prompt)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_protocol::intent::{
        AmbiguityType, ContentType, ResolutionStrategy, ResolvedValue,
    };

    #[tokio::test]
    async fn test_video_without_duration_auto_resolves() {
        let pipeline = IntentPipeline::new(None);
        let classification = pipeline.classify("Create a video", "user-1").await;
        assert_eq!(classification.content_type, ContentType::Video);
        assert!(classification.duration_seconds.is_none());

        let report = pipeline.process("Create a video", &classification);
        assert!(report.has_ambiguities);

        let duration = report
            .resolutions
            .iter()
            .find(|r| r.ambiguity_type == AmbiguityType::DurationMissing)
            .expect("duration resolution present");
        assert_eq!(duration.strategy, ResolutionStrategy::IntelligentDefault);
        assert!(!duration.user_interaction_required);
        match &duration.resolved_value {
            ResolvedValue::Literal { value } => {
                assert_eq!(value.as_u64(), Some(DEFAULT_VIDEO_DURATION_SECS as u64))
            }
            other => panic!("expected literal, got {other:?}"),
        }
        // Nothing blocking: the request can proceed without the user.
        assert!(report.blocking_issues.is_empty());
    }

    #[tokio::test]
    async fn test_style_conflict_requires_user() {
        let pipeline = IntentPipeline::new(None);
        let prompt = "realistic anime cartoon hero";
        let classification = pipeline.classify(prompt, "user-1").await;
        let report = pipeline.process(prompt, &classification);

        assert!(report
            .blocking_issues
            .contains(&AmbiguityType::StyleConflicting));
        assert!(report.requires_user_interaction);

        let style = report
            .resolutions
            .iter()
            .find(|r| r.ambiguity_type == AmbiguityType::StyleConflicting)
            .unwrap();
        assert_eq!(style.strategy, ResolutionStrategy::UserClarification);
        assert!(matches!(
            style.resolved_value,
            ResolvedValue::Question { .. }
        ));
    }

    #[tokio::test]
    async fn test_confidence_is_interaction_weighted() {
        let pipeline = IntentPipeline::new(None);
        let prompt = "an image or a video of a city";
        let classification = pipeline.classify(prompt, "user-1").await;
        let report = pipeline.process(prompt, &classification);

        assert!(report.requires_user_interaction);
        // Weighted mean stays within [0, 1] and below the raw clarification
        // confidence because interactive resolutions weigh 0.8.
        assert!(report.confidence > 0.0 && report.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_clean_request_reports_no_ambiguities() {
        let pipeline = IntentPipeline::new(None);
        let prompt = "Generate a 10 second anime video of Kai fighting in the rain";
        let classification = pipeline.classify(prompt, "user-1").await;
        let report = pipeline.process(prompt, &classification);
        assert!(report.blocking_issues.is_empty());
        assert!(!report.requires_user_interaction);
    }
}
