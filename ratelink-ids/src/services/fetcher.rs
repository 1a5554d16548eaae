//! Background refresh of registry rosters
//!
//! A cycle downloads every configured list, stores what arrived, records
//! the run in `fetch_runs`, and clears the match-result cache so the next
//! resolve sees the new rosters. Cycles are mutually exclusive: a trigger
//! while one is running is a no-op.

use chrono::{DateTime, Utc};
use ratelink_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::LayeredCache;
use crate::config::{FetchSettings, ProgramConfig, ServiceConfig};
use crate::db::fetch_runs::{self, FetchRun, FetchRunStatus};
use crate::matching::MatchResult;
use crate::registry::{FetchError, RegistryResponse, RosterSource};
use crate::services::rosters::RosterCache;
use crate::utils::backoff::{retry_with_backoff, RetryExhausted, Sleeper};

/// Shared fetcher state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchState {
    pub in_progress: bool,
    pub last_successful_fetch: Option<DateTime<Utc>>,
}

/// Result of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub run_id: i64,
    pub status: FetchRunStatus,
    pub lists_fetched: usize,
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

/// `true` if `at` lies more than `max_age` in the past
fn older_than(at: DateTime<Utc>, max_age: Duration) -> bool {
    (Utc::now() - at).to_std().is_ok_and(|age| age > max_age)
}

pub struct Fetcher {
    pool: SqlitePool,
    programs: Arc<Vec<ProgramConfig>>,
    settings: FetchSettings,
    max_lock_wait_ms: u64,
    source: Arc<dyn RosterSource>,
    rosters: RosterCache,
    matches: LayeredCache<MatchResult>,
    sleeper: Arc<dyn Sleeper>,
    state: RwLock<FetchState>,
    /// Held shared by resolvers from roster load to match write; the cycle
    /// takes it exclusively to clear match results
    match_gate: RwLock<()>,
}

impl Fetcher {
    pub fn new(
        pool: SqlitePool,
        config: &ServiceConfig,
        source: Arc<dyn RosterSource>,
        rosters: RosterCache,
        matches: LayeredCache<MatchResult>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            pool,
            programs: Arc::new(config.programs.clone()),
            settings: config.fetch.clone(),
            max_lock_wait_ms: config.max_lock_wait_ms,
            source,
            rosters,
            matches,
            sleeper,
            state: RwLock::new(FetchState::default()),
            match_gate: RwLock::new(()),
        }
    }

    /// Recover state persisted by earlier processes
    ///
    /// Runs left `in_progress` are closed as interrupted, and the last
    /// successful fetch time is reloaded.
    pub async fn restore_state(&self) -> Result<()> {
        let interrupted = fetch_runs::mark_interrupted_runs(&self.pool).await?;
        if interrupted > 0 {
            warn!(interrupted, "Closed fetch runs left open by a previous process");
        }

        let last = fetch_runs::last_successful_fetch(&self.pool).await?;
        match last {
            Some(at) => info!(last_successful_fetch = %at.to_rfc3339(), "Restored fetch state"),
            None => info!("No previous successful fetch"),
        }

        self.state.write().await.last_successful_fetch = last;
        Ok(())
    }

    pub async fn state(&self) -> FetchState {
        self.state.read().await.clone()
    }

    pub async fn latest_run(&self) -> Result<Option<FetchRun>> {
        fetch_runs::latest_run(&self.pool).await
    }

    /// No successful fetch yet, or the last one is older than `stale_after`
    pub async fn is_stale(&self) -> bool {
        self.state
            .read()
            .await
            .last_successful_fetch
            .map_or(true, |at| older_than(at, self.settings.stale_after))
    }

    /// Last successful fetch is within `ready_window`
    pub async fn has_recent_data(&self) -> bool {
        self.state
            .read()
            .await
            .last_successful_fetch
            .is_some_and(|at| !older_than(at, self.settings.ready_window))
    }

    /// Start a cycle in its own task unless one is already running
    ///
    /// The cycle is claimed before this returns, so `true` means a cycle
    /// really runs. It outlives the caller: dropping the caller's future
    /// does not cancel it.
    pub async fn trigger(self: &Arc<Self>) -> bool {
        if !self.claim().await {
            return false;
        }

        let fetcher = Arc::clone(self);
        tokio::spawn(async move {
            fetcher.log_cycle(fetcher.run_claimed().await.map(Some));
        });
        true
    }

    /// Hold off match-cache clearing while results computed from the
    /// current rosters are written
    pub async fn match_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.match_gate.read().await
    }

    /// Spawn the periodic loop; it stops when `shutdown` is cancelled
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let needs_initial = self
                .state
                .read()
                .await
                .last_successful_fetch
                .map_or(true, |at| older_than(at, self.settings.initial_fetch_after));

            if needs_initial {
                info!("Rosters missing or outdated, fetching now");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    result = self.run_cycle() => self.log_cycle(result),
                }
            } else {
                info!("Rosters are recent, skipping initial fetch");
            }

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = self.run_cycle() => self.log_cycle(result),
                }
            }

            info!("Background fetcher stopped");
        })
    }

    fn log_cycle(&self, result: Result<Option<FetchOutcome>>) {
        match result {
            Ok(Some(outcome)) if outcome.errors.is_empty() => info!(
                run_id = outcome.run_id,
                lists = outcome.lists_fetched,
                "Fetch cycle completed"
            ),
            Ok(Some(outcome)) => warn!(
                run_id = outcome.run_id,
                lists = outcome.lists_fetched,
                failed = outcome.errors.len(),
                "Fetch cycle finished with errors"
            ),
            Ok(None) => debug!("Fetch cycle skipped, another one is running"),
            Err(e) => error!(error = %e, "Fetch cycle failed"),
        }
    }

    /// Run one cycle now; `Ok(None)` if another cycle holds the flag
    pub async fn run_cycle(&self) -> Result<Option<FetchOutcome>> {
        if !self.claim().await {
            return Ok(None);
        }
        self.run_claimed().await.map(Some)
    }

    /// Set `in_progress`; `false` if it was already set
    async fn claim(&self) -> bool {
        let mut state = self.state.write().await;
        if state.in_progress {
            return false;
        }
        state.in_progress = true;
        true
    }

    /// Cycle body for a caller that holds the `in_progress` claim
    async fn run_claimed(&self) -> Result<FetchOutcome> {
        let result = self.fetch_all().await;

        let mut state = self.state.write().await;
        state.in_progress = false;
        let outcome = result?;
        state.last_successful_fetch = Some(outcome.finished_at);
        Ok(outcome)
    }

    async fn fetch_all(&self) -> Result<FetchOutcome> {
        let total = self.programs.len() as i64;
        let run_id = fetch_runs::start_run(&self.pool, total, self.max_lock_wait_ms).await?;
        info!(run_id, programs = total, "Fetch cycle started");

        let mut errors = Vec::new();
        let mut lists_fetched = 0;

        for (idx, program) in self.programs.iter().enumerate() {
            if idx > 0 {
                self.sleeper.sleep(self.settings.program_spacing).await;
            }

            for (pos, (kind, list_id)) in program.lists().into_iter().enumerate() {
                if pos > 0 {
                    self.sleeper.sleep(self.settings.request_spacing).await;
                }

                match self.fetch_list(list_id).await {
                    Ok(roster) => {
                        debug!(
                            program = %program.name,
                            kind = %kind,
                            list_id,
                            applicants = roster.applicants.len(),
                            "Roster stored"
                        );
                        self.rosters
                            .store(&program.name, kind, list_id, roster.applicants)
                            .await;
                        lists_fetched += 1;
                    }
                    Err(e) => {
                        warn!(program = %program.name, kind = %kind, list_id, error = %e, "Roster fetch failed");
                        errors.push(format!("{}/{} ({}): {}", program.name, kind, list_id, e));
                    }
                }
            }

            if let Err(e) =
                fetch_runs::update_progress(&self.pool, run_id, idx as i64 + 1, self.max_lock_wait_ms).await
            {
                warn!(run_id, error = %e, "Could not persist fetch progress");
            }
        }

        let status = if errors.is_empty() {
            FetchRunStatus::Completed
        } else {
            FetchRunStatus::Partial
        };
        // Cached matches were computed against the previous rosters
        {
            let _gate = self.match_gate.write().await;
            self.matches.clear().await;
        }

        let message = (!errors.is_empty()).then(|| errors.join("; "));
        let finished_at =
            fetch_runs::finish_run(&self.pool, run_id, status, message.as_deref(), self.max_lock_wait_ms).await?;
        let purged = self.rosters.purge_expired() + self.matches.purge_expired();
        debug!(purged, "Expired memory cache entries dropped");

        Ok(FetchOutcome {
            run_id,
            status,
            lists_fetched,
            errors,
            finished_at,
        })
    }

    async fn fetch_list(&self, list_id: &str) -> std::result::Result<RegistryResponse, RetryExhausted<FetchError>> {
        let timeout = self.settings.request_timeout;
        let source = self.source.as_ref();

        retry_with_backoff(&self.settings.retry, self.sleeper.as_ref(), "fetch_roster", || async move {
            match tokio::time::timeout(timeout, source.fetch_roster(list_id)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            }
        })
        .await
    }
}
