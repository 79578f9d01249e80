use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

/// Persistent set of already-processed dedup keys. Bounded: after each insert
/// the oldest entries beyond `max_entries` are pruned. A single pooled
/// connection serializes writers.
#[derive(Clone)]
pub struct DedupStore {
    pool: SqlitePool,
    max_entries: i64,
}

impl DedupStore {
    pub async fn connect(database_url: &str, max_entries: u32) -> Result<Self, anyhow::Error> {
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(dir) = Path::new(path).parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
        }
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // One connection serializes writers and keeps in-memory databases
        // alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self {
            pool,
            max_entries: i64::from(max_entries),
        })
    }

    pub async fn has(&self, key: &str) -> Result<bool, anyhow::Error> {
        let row = sqlx::query("SELECT 1 FROM processed_events WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Records a key as processed. Re-adding an existing key keeps its
    /// original timestamp. Prunes oldest-first down to the configured bound.
    pub async fn add(&self, key: &str) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO processed_events (key, seen_at) VALUES ($1, $2)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM processed_events WHERE key NOT IN (
                 SELECT key FROM processed_events
                 ORDER BY seen_at DESC, rowid DESC
                 LIMIT $1
             )",
        )
        .bind(self.max_entries)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<i64, anyhow::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM processed_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
