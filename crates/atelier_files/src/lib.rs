//! File organizer - backend outputs land where consumers can find them.
//!
//! Layout: `{root}/projects/{project_id}/{job_id}/{job_id}_{ts}_{kind}{ext}`
//! with a `.meta.json` sidecar per file and a top-level `file_metadata.json`
//! index keyed by absolute path. Jobs without a project go under
//! `general`. Concurrent movers for the same job serialize on a per-job
//! lock.

mod organizer;
mod validate;

pub use organizer::{
    CleanupReport, FileKind, FileOrganizer, FileRecord, MigrationReport, ProjectSummary,
};
pub use validate::{validate_project_id, validate_source_name};
