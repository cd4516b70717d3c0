//! Shared application state for all HTTP/WS handlers.
//!
//! Process-wide components are created once at startup and injected here -
//! no implicit globals.

use crate::config::AtelierConfig;
use atelier_catalog::CatalogStore;
use atelier_comfy::ComfyClient;
use atelier_files::FileOrganizer;
use atelier_index::{IndexRebuilder, ReferenceIndex};
use atelier_intent::IntentPipeline;
use atelier_jobs::{JobManager, JobQueue, StatusMonitor};
use atelier_narrative::{NarrativeEngine, NarrativeHooks};
use atelier_quality::QualityGate;
use atelier_resolver::ResourceResolver;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, OnceLock};

pub struct AppState {
    pub config: AtelierConfig,
    pub catalog: CatalogStore,
    pub comfy: ComfyClient,
    pub manager: JobManager,
    pub monitor: StatusMonitor,
    /// Set once at startup, after the worker pool (which itself needs the
    /// shared state) has been spawned.
    queue: OnceLock<JobQueue>,
    pub intent: IntentPipeline,
    pub resolver: ResourceResolver,
    pub organizer: FileOrganizer,
    pub quality: QualityGate,
    pub narrative: NarrativeEngine,
    pub hooks: NarrativeHooks,
    pub index: Option<ReferenceIndex>,
    pub rebuilder: Option<IndexRebuilder>,
    /// Currently-open job websockets, for the health endpoint.
    pub active_websockets: AtomicUsize,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AtelierConfig,
        catalog: CatalogStore,
        comfy: ComfyClient,
        manager: JobManager,
        monitor: StatusMonitor,
        intent: IntentPipeline,
        resolver: ResourceResolver,
        organizer: FileOrganizer,
        narrative: NarrativeEngine,
        hooks: NarrativeHooks,
        index: Option<ReferenceIndex>,
        rebuilder: Option<IndexRebuilder>,
    ) -> Self {
        Self {
            config,
            catalog,
            comfy,
            manager,
            monitor,
            queue: OnceLock::new(),
            intent,
            resolver,
            organizer,
            quality: QualityGate::new(),
            narrative,
            hooks,
            index,
            rebuilder,
            active_websockets: AtomicUsize::new(0),
        }
    }

    /// Install the worker queue. Called exactly once during startup.
    pub fn attach_queue(&self, queue: JobQueue) {
        if self.queue.set(queue).is_err() {
            unreachable!("worker queue attached twice");
        }
    }

    pub fn queue(&self) -> &JobQueue {
        self.queue
            .get()
            .expect("worker queue is attached before the server starts")
    }
}

pub type SharedState = Arc<AppState>;
