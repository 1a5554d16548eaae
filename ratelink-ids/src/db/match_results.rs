//! Resolved match results

use async_trait::async_trait;
use chrono::Utc;
use ratelink_common::{Competition, Error, Result};
use sqlx::{Row, SqlitePool};

use crate::cache::PersistentStore;
use crate::matching::{MatchResult, MatchType, UNKNOWN};
use crate::utils::retry_on_lock;

/// Load the stored result for one internal ID
pub async fn load_match(pool: &SqlitePool, internal_id: &str) -> Result<Option<MatchResult>> {
    let row = sqlx::query(
        r#"
        SELECT internal_id, canonical_id, confidence, match_type, program_name, competition_type
        FROM match_results
        WHERE internal_id = ?
        "#,
    )
    .bind(internal_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let match_type: String = row.get("match_type");
    let competition: String = row.get("competition_type");
    let competition_type = if competition == UNKNOWN {
        None
    } else {
        Some(competition.parse()?)
    };

    Ok(Some(MatchResult {
        internal_id: row.get("internal_id"),
        canonical_id: row.get("canonical_id"),
        confidence: row.get("confidence"),
        match_type: match_type.parse()?,
        program_name: row.get("program_name"),
        competition_type,
    }))
}

/// Insert or replace the result for its internal ID
pub async fn save_match(pool: &SqlitePool, result: &MatchResult, max_wait_ms: u64) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    retry_on_lock("save_match", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO match_results (
                internal_id, canonical_id, confidence, match_type,
                program_name, competition_type, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(internal_id) DO UPDATE SET
                canonical_id = excluded.canonical_id,
                confidence = excluded.confidence,
                match_type = excluded.match_type,
                program_name = excluded.program_name,
                competition_type = excluded.competition_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&result.internal_id)
        .bind(&result.canonical_id)
        .bind(result.confidence)
        .bind(result.match_type.as_str())
        .bind(&result.program_name)
        .bind(result.competition_label())
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// `(canonical_id, internal_id)` of every stored one-to-one match
///
/// Fallbacks and DedicatedQuota results do not reserve their canonical ID.
pub async fn load_reserved(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT canonical_id, internal_id
        FROM match_results
        WHERE match_type != ? AND competition_type != ?
        ORDER BY internal_id
        "#,
    )
    .bind(MatchType::Fallback.as_str())
    .bind(Competition::DedicatedQuota.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("canonical_id"), row.get("internal_id")))
        .collect())
}

/// Delete every stored result
pub async fn delete_all_matches(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM match_results").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Durable layer of the match-result cache
pub struct SqliteMatchStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteMatchStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Canonical IDs held by stored one-to-one matches; empty on read failure
    pub async fn reserved(&self) -> Vec<(String, String)> {
        match load_reserved(&self.pool).await {
            Ok(reserved) => reserved,
            Err(e) => {
                tracing::warn!(error = %e, "Reserved canonical ID read failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl PersistentStore<MatchResult> for SqliteMatchStore {
    async fn get(&self, key: &str) -> Option<MatchResult> {
        match load_match(&self.pool, key).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(internal_id = key, error = %e, "Match result read failed");
                None
            }
        }
    }

    async fn set(&self, _key: &str, value: &MatchResult) {
        if let Err(e) = save_match(&self.pool, value, self.max_lock_wait_ms).await {
            tracing::warn!(internal_id = %value.internal_id, error = %e, "Match result write failed");
        }
    }

    async fn clear(&self) {
        match delete_all_matches(&self.pool).await {
            Ok(removed) => tracing::debug!(removed, "Match results cleared"),
            Err(e) => tracing::warn!(error = %e, "Match result clear failed"),
        }
    }
}
