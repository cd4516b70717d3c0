//! Shared types and contracts for Atelier.
//!
//! Canonical definitions for jobs, intent classification, narrative state,
//! quality contracts, and the HTTP surface. This crate holds types only -
//! no I/O lives here.

pub mod catalog;
pub mod error;
pub mod http;
pub mod ids;
pub mod intent;
pub mod job;
pub mod narrative;
pub mod plan;
pub mod progress;
pub mod quality;

pub use catalog::{
    Appearance, Character, Episode, EpisodeScene, GenerationStyle, Project, QualityFeedback,
    Scene, Shot, VoiceProfile,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use ids::{IdParseError, JobId, RequestId, ResourceId};
pub use intent::{
    AmbiguityDetection, AmbiguitySeverity, AmbiguityType, CharacterEntity, ComplexityLevel,
    ContentType, ContextualAnalysis, GenerationScope, IntentClassification, ResolutionReport,
    ResolutionResult, ResolutionStrategy, ResolvedValue, StylePreference, UrgencyLevel,
};
pub use job::{Job, JobStatistics, JobStatus, JobType};
pub use plan::{LoraSpec, DEFAULT_LORA_STRENGTH};
pub use narrative::{
    BodyState, CharacterSceneState, EnergyLevel, Injury, InjurySeverity, RegenerationEntry,
    RegenerationStatus, StatePatch, StateSource,
};
pub use progress::{ProgressStatus, ProgressUpdate};
pub use quality::{ContractResult, GateResult};
