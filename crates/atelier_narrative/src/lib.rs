//! Narrative state engine - per-scene, per-character continuity with
//! deterministic forward propagation and change-driven invalidation.

pub mod decay;
pub mod engine;
pub mod hooks;

pub use decay::{
    apply_decay, decay_body_state, decay_emotion, decay_energy, decay_injuries, decay_injury,
};
pub use engine::{NarrativeEngine, NARRATIVE_LLM_TIMEOUT};
pub use hooks::{HookOutcome, NarrativeEvent, NarrativeHooks};
