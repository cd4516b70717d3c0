//! Plan-level resource types shared between the resolver and the composer.

use serde::{Deserialize, Serialize};

/// Default LoRA strength applied when a character LoRA is selected.
pub const DEFAULT_LORA_STRENGTH: f64 = 0.85;

/// One selected LoRA. The trigger token must appear in the positive prompt
/// or the adapter never activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSpec {
    /// Weight file name as stored on disk.
    pub name: String,
    /// Applied to both model and clip strengths.
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl LoraSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strength: DEFAULT_LORA_STRENGTH,
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }
}
