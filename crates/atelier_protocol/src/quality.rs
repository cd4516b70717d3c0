//! Quality-contract result types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One gate outcome: observed value against its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub value: serde_json::Value,
    pub threshold: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl GateResult {
    pub fn pass(value: impl Into<serde_json::Value>, threshold: impl Into<String>) -> Self {
        Self {
            passed: true,
            value: value.into(),
            threshold: threshold.into(),
            details: None,
        }
    }

    pub fn fail(value: impl Into<serde_json::Value>, threshold: impl Into<String>) -> Self {
        Self {
            passed: false,
            value: value.into(),
            threshold: threshold.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Full contract-validation result for one produced artifact.
///
/// `passed` requires every structural and motion gate to pass AND
/// `quality_score > 0.5`. Visual gates contribute to the score only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractResult {
    pub passed: bool,
    /// Weighted mean of the visual gates, in [0, 1].
    pub quality_score: f64,
    pub structural_gates: BTreeMap<String, GateResult>,
    pub motion_gates: BTreeMap<String, GateResult>,
    pub quality_gates: BTreeMap<String, GateResult>,
    #[serde(default)]
    pub frame_samples: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub generation_params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContractResult {
    /// A contract that failed before any gate could run.
    pub fn rejected(reason: impl Into<String>, generation_params: serde_json::Value) -> Self {
        let reason = reason.into();
        Self {
            passed: false,
            quality_score: 0.0,
            structural_gates: BTreeMap::new(),
            motion_gates: BTreeMap::new(),
            quality_gates: BTreeMap::new(),
            frame_samples: Vec::new(),
            recommendations: Vec::new(),
            generation_params,
            error: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_result_builders() {
        let gate = GateResult::pass(24, ">=12").with_details("frame count from probe");
        assert!(gate.passed);
        assert_eq!(gate.value, serde_json::json!(24));
        assert_eq!(gate.threshold, ">=12");
    }

    #[test]
    fn test_rejected_contract() {
        let result = ContractResult::rejected("file missing", serde_json::json!({}));
        assert!(!result.passed);
        assert_eq!(result.quality_score, 0.0);
        assert!(result.error.is_some());
    }
}
