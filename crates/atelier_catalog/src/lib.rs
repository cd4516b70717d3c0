//! Catalog store - the single source of truth for Atelier.
//!
//! Everything persistent lives here: projects, generation styles,
//! characters, scenes, shots, episodes, jobs, narrative state, the
//! regeneration queue, and quality feedback. The reference index only ever
//! holds pointers back into these tables.

mod characters;
mod error;
mod jobs;
mod narrative;
mod pool;
mod projects;
mod quality;
mod scenes;
mod schema;

pub use characters::{CharacterStore, CharacterUpsert};
pub use error::{CatalogError, Result};
pub use jobs::JobStore;
pub use narrative::{NarrativeStore, NewRegeneration};
pub use pool::{create_pool, CatalogConfig};
pub use projects::{ProjectStore, ProjectUpsert};
pub use quality::{ProjectStats, QualityStore};
pub use scenes::{CompletedShotRef, SceneStore};
pub use schema::init_schema;

use sqlx::SqlitePool;

/// Handle to the catalog database. Cheap to clone; sub-stores borrow the
/// shared pool.
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Connect (with bounded retry) and initialize the schema.
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn projects(&self) -> ProjectStore {
        ProjectStore::new(self.pool.clone())
    }

    pub fn characters(&self) -> CharacterStore {
        CharacterStore::new(self.pool.clone())
    }

    pub fn scenes(&self) -> SceneStore {
        SceneStore::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobStore {
        JobStore::new(self.pool.clone())
    }

    pub fn narrative(&self) -> NarrativeStore {
        NarrativeStore::new(self.pool.clone())
    }

    pub fn quality(&self) -> QualityStore {
        QualityStore::new(self.pool.clone())
    }

    /// In-memory store with schema applied, for tests.
    pub async fn memory() -> Result<Self> {
        Self::connect(&CatalogConfig::sqlite_memory()).await
    }
}
