//! Quality gate - deterministic contract validation of produced artifacts.
//!
//! Structural gates (existence, size, container, frame count, duration,
//! resolution) and motion gates (unique frames, SSIM variance, motion
//! magnitude) must all pass; visual gates (blank, sharpness, color,
//! overall) feed the weighted quality score. `passed` requires all three:
//! structural ∧ motion ∧ score > 0.5.

pub mod contract;
pub mod metrics;
pub mod probe;

pub use contract::{ExpectedType, QualityGate};
pub use probe::MediaInfo;
