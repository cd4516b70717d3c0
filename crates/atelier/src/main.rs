//! Atelier server entry point - wire components, spawn background tasks,
//! serve.

use anyhow::{Context, Result};
use atelier::config::AtelierConfig;
use atelier::state::{AppState, SharedState};
use atelier::{pipeline, routes};
use atelier_catalog::{CatalogConfig, CatalogStore};
use atelier_comfy::ComfyClient;
use atelier_echo::EchoClient;
use atelier_files::FileOrganizer;
use atelier_index::{EmbedClient, IndexRebuilder, QdrantClient, ReferenceIndex};
use atelier_intent::IntentPipeline;
use atelier_jobs::{spawn_workers, JobManager, StatusMonitor};
use atelier_logging::{init_logging, LogConfig};
use atelier_narrative::{NarrativeEngine, NarrativeHooks};
use atelier_resolver::{ResolverConfig, ResourceResolver};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "atelier", about = "Generation-job orchestrator")]
struct Args {
    /// Override the API port from the environment.
    #[arg(long)]
    port: Option<u16>,

    /// Mirror the full log stream to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LogConfig {
        app_name: "atelier",
        verbose: args.verbose,
    })?;

    let mut config = AtelierConfig::from_env()?;
    if let Some(port) = args.port {
        config.api_port = port;
    }

    let state = build_state(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(state.monitor.clone().run(shutdown_rx));

    let addr = format!("0.0.0.0:{}", state.config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("Atelier listening on {}", addr);

    let router = routes::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    info!("Atelier stopped");
    Ok(())
}

async fn build_state(config: AtelierConfig) -> Result<SharedState> {
    let catalog = CatalogStore::connect(&CatalogConfig::from_url(&config.database_url))
        .await
        .context("catalog store unavailable")?;

    let comfy = ComfyClient::new(config.comfyui_url.clone());
    let echo = config
        .echo_url
        .as_ref()
        .map(|url| EchoClient::new(url.clone()));

    let (index, rebuilder) = match &config.qdrant_url {
        Some(url) => {
            let qdrant = QdrantClient::new(url.clone());
            let embedder = EmbedClient::new(config.ollama_url.clone());
            let index = ReferenceIndex::new(qdrant.clone(), embedder.clone());
            let rebuilder = IndexRebuilder::new(catalog.clone(), qdrant, embedder);
            (Some(index), Some(rebuilder))
        }
        None => (None, None),
    };

    let manager = JobManager::new(catalog.clone());
    manager.recover().await?;
    let (monitor, completions) = StatusMonitor::new(manager.clone(), comfy.clone());

    let resolver = ResourceResolver::new(
        catalog.clone(),
        index.clone(),
        ResolverConfig {
            workflow_dir: config.workflow_dir.clone(),
            checkpoint_dir: config.checkpoint_dir.clone(),
            lora_dirs: vec![config.lora_dir.clone()],
        },
    );

    let organizer = FileOrganizer::open(config.organized_dir.clone(), config.output_dir.clone())
        .await
        .map_err(|e| anyhow::anyhow!("output root unavailable: {e}"))?;

    let narrative = NarrativeEngine::new(catalog.clone(), echo.clone());
    let hooks = NarrativeHooks::new(
        catalog.clone(),
        NarrativeEngine::new(catalog.clone(), echo.clone()),
    );

    let state = Arc::new(AppState::new(
        config,
        catalog,
        comfy,
        manager,
        monitor,
        IntentPipeline::new(echo),
        resolver,
        organizer,
        narrative,
        hooks,
        index,
        rebuilder,
    ));

    // Worker pool closes over the shared state; the queue handle goes back
    // into it.
    let worker_state = Arc::clone(&state);
    let queue = spawn_workers(state.config.max_workers, move |job_id| {
        pipeline::execute_job(Arc::clone(&worker_state), job_id)
    });
    state.attach_queue(queue);

    // Completion pipeline consumes monitor events.
    let completion_state = Arc::clone(&state);
    tokio::spawn(pipeline::completion_loop(completion_state, completions));

    // Hourly maintenance: drop stale terminal jobs and expired outputs.
    let maintenance_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = maintenance_state.manager.cleanup_old_jobs(24).await;
            let report = maintenance_state.organizer.cleanup_old_files(30).await;
            info!(
                "Maintenance pass: {} jobs removed, {} files deleted ({} bytes)",
                removed, report.deleted_files, report.freed_bytes
            );
        }
    });

    Ok(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
