//! Journal of registry fetch cycles

use chrono::{DateTime, Utc};
use ratelink_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::utils::retry_on_lock;

/// Message recorded on runs abandoned by a previous process
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchRunStatus {
    InProgress,
    Completed,
    /// Finished, but some lists failed
    Partial,
}

impl FetchRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchRunStatus::InProgress => "in_progress",
            FetchRunStatus::Completed => "completed",
            FetchRunStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for FetchRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchRunStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(FetchRunStatus::InProgress),
            "completed" => Ok(FetchRunStatus::Completed),
            "partial" => Ok(FetchRunStatus::Partial),
            other => Err(Error::Internal(format!("Unknown fetch run status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: FetchRunStatus,
    pub error_message: Option<String>,
    pub programs_processed: i64,
    pub total_programs: i64,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp {:?}: {}", value, e)))
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<FetchRun> {
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");
    let status: String = row.get("status");

    Ok(FetchRun {
        id: row.get("id"),
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        status: status.parse()?,
        error_message: row.get("error_message"),
        programs_processed: row.get("programs_processed"),
        total_programs: row.get("total_programs"),
    })
}

/// Record the start of a cycle; returns the run ID
pub async fn start_run(pool: &SqlitePool, total_programs: i64, max_wait_ms: u64) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    retry_on_lock("start_fetch_run", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO fetch_runs (started_at, status, programs_processed, total_programs, updated_at)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(&now)
        .bind(FetchRunStatus::InProgress.as_str())
        .bind(total_programs)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.last_insert_rowid())
    })
    .await
}

/// Persist the number of programs processed so far
pub async fn update_progress(pool: &SqlitePool, run_id: i64, programs_processed: i64, max_wait_ms: u64) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    retry_on_lock("update_fetch_progress", max_wait_ms, || async {
        sqlx::query("UPDATE fetch_runs SET programs_processed = ?, updated_at = ? WHERE id = ?")
            .bind(programs_processed)
            .bind(&now)
            .bind(run_id)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Mark a run finished with the given status
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: i64,
    status: FetchRunStatus,
    error_message: Option<&str>,
    max_wait_ms: u64,
) -> Result<DateTime<Utc>> {
    let finished_at = Utc::now();
    let now = finished_at.to_rfc3339();

    retry_on_lock("finish_fetch_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            UPDATE fetch_runs
            SET status = ?, completed_at = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(error_message)
        .bind(&now)
        .bind(run_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await?;

    Ok(finished_at)
}

/// Most recent run of any status
pub async fn latest_run(pool: &SqlitePool) -> Result<Option<FetchRun>> {
    let row = sqlx::query("SELECT * FROM fetch_runs ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_run).transpose()
}

/// Completion time of the most recent finished run
pub async fn last_successful_fetch(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    let completed_at: Option<String> = sqlx::query_scalar(
        r#"
        SELECT completed_at FROM fetch_runs
        WHERE status IN ('completed', 'partial') AND completed_at IS NOT NULL
        ORDER BY id DESC LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    completed_at.as_deref().map(parse_timestamp).transpose()
}

/// Close runs left `in_progress` by a process that died mid-cycle
pub async fn mark_interrupted_runs(pool: &SqlitePool) -> Result<u64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE fetch_runs
        SET status = 'partial', error_message = ?, updated_at = ?
        WHERE status = 'in_progress'
        "#,
    )
    .bind(INTERRUPTED_MESSAGE)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, DEFAULT_MAX_LOCK_WAIT_MS};

    #[tokio::test]
    async fn test_run_lifecycle() {
        let pool = init_memory_pool().await.unwrap();
        assert!(latest_run(&pool).await.unwrap().is_none());
        assert!(last_successful_fetch(&pool).await.unwrap().is_none());

        let id = start_run(&pool, 3, DEFAULT_MAX_LOCK_WAIT_MS).await.unwrap();
        update_progress(&pool, id, 2, DEFAULT_MAX_LOCK_WAIT_MS).await.unwrap();

        let run = latest_run(&pool).await.unwrap().unwrap();
        assert_eq!(run.status, FetchRunStatus::InProgress);
        assert_eq!(run.programs_processed, 2);
        assert_eq!(run.total_programs, 3);
        assert!(last_successful_fetch(&pool).await.unwrap().is_none());

        finish_run(&pool, id, FetchRunStatus::Partial, Some("Math/RegularBVI: HTTP 500"), DEFAULT_MAX_LOCK_WAIT_MS)
            .await
            .unwrap();

        let run = latest_run(&pool).await.unwrap().unwrap();
        assert_eq!(run.status, FetchRunStatus::Partial);
        assert!(run.completed_at.is_some());
        assert_eq!(run.error_message.as_deref(), Some("Math/RegularBVI: HTTP 500"));
        assert_eq!(last_successful_fetch(&pool).await.unwrap(), run.completed_at);
    }

    #[tokio::test]
    async fn test_interrupted_runs_are_closed() {
        let pool = init_memory_pool().await.unwrap();
        start_run(&pool, 1, DEFAULT_MAX_LOCK_WAIT_MS).await.unwrap();

        assert_eq!(mark_interrupted_runs(&pool).await.unwrap(), 1);

        let run = latest_run(&pool).await.unwrap().unwrap();
        assert_eq!(run.status, FetchRunStatus::Partial);
        assert_eq!(run.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        // Never completed, so it does not count as a successful fetch
        assert!(last_successful_fetch(&pool).await.unwrap().is_none());
    }
}
