//! Route table - every surface bound in one place.

use crate::handlers::{admin, characters, generate, health, jobs, narrative, projects};
use crate::state::SharedState;
use crate::ws;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Generation
        .route("/generate", post(generate::generate))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}", delete(jobs::cancel_job))
        .route("/health", get(health::health))
        .route("/ws/{job_id}", get(ws::job_ws))
        // Catalog
        .route("/api/anime/projects", post(projects::create_project))
        .route("/api/anime/projects", get(projects::list_projects))
        .route("/api/anime/projects/{id}", get(projects::get_project))
        .route("/api/anime/projects/{id}/stats", get(projects::project_stats))
        .route("/api/anime/characters", post(characters::create_character))
        .route("/api/anime/characters/{id}", get(characters::get_character))
        .route(
            "/api/anime/characters/{id}/bible",
            get(characters::character_bible),
        )
        .route(
            "/api/story/characters/{slug}",
            axum::routing::patch(characters::patch_character),
        )
        .route(
            "/api/story/characters/{slug}/detail",
            get(characters::character_detail),
        )
        // Narrative state
        .route("/api/narrative/state/{scene_id}", get(narrative::scene_states))
        .route(
            "/api/narrative/state/{scene_id}/{slug}",
            get(narrative::get_state),
        )
        .route(
            "/api/narrative/state/{scene_id}/{slug}",
            put(narrative::put_state),
        )
        .route(
            "/api/narrative/state/{scene_id}/{slug}",
            delete(narrative::delete_state),
        )
        .route(
            "/api/narrative/state/{scene_id}/initialize",
            post(narrative::initialize_scene),
        )
        .route(
            "/api/narrative/state/{scene_id}/propagate",
            post(narrative::propagate_scene),
        )
        .route(
            "/api/narrative/timeline/{project_id}/{slug}",
            get(narrative::state_timeline),
        )
        .route(
            "/api/narrative/regeneration-queue/{project_id}",
            get(narrative::regeneration_queue),
        )
        // Admin
        .route("/api/index/rebuild", post(admin::rebuild_index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
