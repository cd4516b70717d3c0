//! Resource resolution (the SSOT contract in practice).
//!
//! Characters come straight from the catalog by name; the reference index
//! contributes scene context only; everything the index returns is
//! re-fetched from the catalog before it touches a prompt.

pub mod analysis;
pub mod resolver;

pub use analysis::{analyze, ContentAnalysis};
pub use resolver::{
    FreshData, GenerationPlan, ResolverConfig, ResourceResolver, ResourceSelection,
};
