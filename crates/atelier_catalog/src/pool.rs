//! Database pool creation with bounded connection retry.

use crate::error::{CatalogError, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

/// Initial retry delay for connection attempts.
const BACKOFF_INITIAL_MS: u64 = 100;
/// Multiplier applied per attempt.
const BACKOFF_FACTOR: u32 = 2;
/// Delay cap.
const BACKOFF_MAX_MS: u64 = 5_000;
/// Total attempts before surfacing `Unavailable`.
const MAX_ATTEMPTS: u32 = 5;

/// Catalog store configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// sqlx connection URL, e.g. `sqlite:atelier.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

impl CatalogConfig {
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// In-memory database for tests.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }
}

/// Create a pool, retrying connection failures with exponential backoff
/// (100ms, x2, cap 5s, 5 attempts). Exhaustion surfaces as `Unavailable`.
pub async fn create_pool(config: &CatalogConfig) -> Result<SqlitePool> {
    let mut delay = Duration::from_millis(BACKOFF_INITIAL_MS);
    let mut last_error = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        match SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
        {
            Ok(pool) => {
                apply_sqlite_pragmas(&pool).await?;
                info!("Connected to catalog database at {}", config.url);
                return Ok(pool);
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    "Catalog connection attempt {}/{} failed: {}",
                    attempt, MAX_ATTEMPTS, last_error
                );
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = (delay * BACKOFF_FACTOR).min(Duration::from_millis(BACKOFF_MAX_MS));
                }
            }
        }
    }

    Err(CatalogError::Unavailable(format!(
        "gave up after {} attempts: {}",
        MAX_ATTEMPTS, last_error
    )))
}

/// WAL for concurrent readers, NORMAL sync for throughput.
async fn apply_sqlite_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool() {
        let pool = create_pool(&CatalogConfig::sqlite_memory()).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_bad_url_surfaces_unavailable() {
        let config = CatalogConfig::from_url("sqlite:/nonexistent-dir/deeper/db.sqlite");
        let result = create_pool(&config).await;
        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }
}
