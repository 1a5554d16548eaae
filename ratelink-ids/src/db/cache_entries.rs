//! Generic JSON key/value store backing the roster cache

use async_trait::async_trait;
use chrono::Utc;
use ratelink_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::marker::PhantomData;

use crate::cache::PersistentStore;
use crate::utils::retry_on_lock;

/// Load the raw JSON stored under `key`
pub async fn load_entry(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Insert or replace the JSON stored under `key`
pub async fn save_entry(pool: &SqlitePool, key: &str, value: &str, max_wait_ms: u64) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    retry_on_lock("save_cache_entry", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Delete every cache entry
pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Number of entries whose key starts with `prefix`
pub async fn count_with_prefix(pool: &SqlitePool, prefix: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries WHERE key LIKE ? || '%'")
        .bind(prefix)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Durable cache layer storing `V` as JSON in `cache_entries`
pub struct SqliteKvStore<V> {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
    _value: PhantomData<fn() -> V>,
}

impl<V> SqliteKvStore<V> {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<V> PersistentStore<V> for SqliteKvStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let raw = match load_entry(&self.pool, key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache entry read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache entry is not valid JSON, ignoring");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &V) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache entry serialization failed");
                return;
            }
        };

        if let Err(e) = save_entry(&self.pool, key, &raw, self.max_lock_wait_ms).await {
            tracing::warn!(key, error = %e, "Cache entry write failed");
        }
    }

    async fn clear(&self) {
        if let Err(e) = delete_all(&self.pool).await {
            tracing::warn!(error = %e, "Cache clear failed");
        }
    }
}
