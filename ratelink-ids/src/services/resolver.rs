//! Resolution facade: cache lookup, matching, and readiness

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratelink_common::{IdResolver, ResolveRequestItem, ResolveResponseItem, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::LayeredCache;
use crate::config::ProgramConfig;
use crate::db::fetch_runs::FetchRun;
use crate::db::SqliteMatchStore;
use crate::matching::{MatchResult, MatchingEngine, UNKNOWN};
use crate::services::fetcher::Fetcher;
use crate::services::rosters::RosterCache;

/// Fetcher state as reported by `/fetch/status`
#[derive(Debug, Clone, Serialize)]
pub struct FetchStatus {
    pub in_progress: bool,
    pub last_successful_fetch: Option<DateTime<Utc>>,
    pub latest_run: Option<FetchRun>,
}

pub struct ResolutionService {
    programs: Arc<Vec<ProgramConfig>>,
    rosters: RosterCache,
    matches: LayeredCache<MatchResult>,
    /// Durable side of `matches`, read for canonical IDs already handed out
    match_store: Arc<SqliteMatchStore>,
    fetcher: Arc<Fetcher>,
    /// One batch matches at a time so reservations are never read stale
    matching: Mutex<()>,
}

fn unmatched_fallback(item: &ResolveRequestItem) -> MatchResult {
    match item.apps.first() {
        Some(app) => MatchResult::fallback(&item.internal_id, &app.pretty_name, Some(app.competition())),
        None => MatchResult::fallback(&item.internal_id, UNKNOWN, None),
    }
}

impl ResolutionService {
    pub fn new(
        programs: Arc<Vec<ProgramConfig>>,
        rosters: RosterCache,
        matches: LayeredCache<MatchResult>,
        match_store: Arc<SqliteMatchStore>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        Self {
            programs,
            rosters,
            matches,
            match_store,
            fetcher,
            matching: Mutex::new(()),
        }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Resolve a batch; exactly one response per request item, in order
    ///
    /// Repeated internal IDs are matched once with their applications
    /// combined.
    pub async fn resolve(&self, items: &[ResolveRequestItem]) -> Vec<ResolveResponseItem> {
        if self.fetcher.is_stale().await && self.fetcher.trigger().await {
            info!("Roster data is stale, background fetch started");
        }

        let mut resolved: HashMap<String, MatchResult> = HashMap::new();
        let mut pending: Vec<ResolveRequestItem> = Vec::new();
        let mut pending_index: HashMap<&str, usize> = HashMap::new();

        for item in items {
            if resolved.contains_key(&item.internal_id) {
                continue;
            }
            if let Some(&idx) = pending_index.get(item.internal_id.as_str()) {
                pending[idx].apps.extend(item.apps.iter().cloned());
                continue;
            }
            match self.matches.get(&item.internal_id).await {
                Some(result) => {
                    resolved.insert(item.internal_id.clone(), result);
                }
                None => {
                    pending_index.insert(item.internal_id.as_str(), pending.len());
                    pending.push(item.clone());
                }
            }
        }

        let cached = resolved.len();
        if !pending.is_empty() {
            // Results are written before a roster refresh can clear them
            let _matching = self.matching.lock().await;
            let _gate = self.fetcher.match_gate().await;
            let rosters = self.rosters.load_all(&self.programs).await;

            if rosters.is_empty() {
                warn!(pending = pending.len(), "No roster data cached, answering with fallback identities");
                for item in &pending {
                    resolved.insert(item.internal_id.clone(), unmatched_fallback(item));
                }
            } else {
                let reserved = self.match_store.reserved().await;
                let engine = MatchingEngine::new(&rosters).with_reserved(reserved);
                for result in engine.execute(&pending) {
                    self.matches.set(&result.internal_id, result.clone()).await;
                    resolved.insert(result.internal_id.clone(), result);
                }
            }
        }

        info!(
            items = items.len(),
            cached,
            matched = pending.len(),
            "Resolve batch finished"
        );

        items
            .iter()
            .map(|item| match resolved.get(&item.internal_id) {
                Some(result) => ResolveResponseItem {
                    internal_id: item.internal_id.clone(),
                    canonical_id: result.canonical_id.clone(),
                    confidence: result.confidence,
                },
                None => ResolveResponseItem::fallback(&item.internal_id),
            })
            .collect()
    }

    /// Ready when a fetch finished within the ready window
    ///
    /// With no roster data at all a fetch is started as a side effect.
    pub async fn is_ready(&self) -> bool {
        if !self.programs.is_empty() && !self.rosters.has_any(&self.programs).await {
            if self.fetcher.trigger().await {
                info!("No roster data yet, fetch started");
            }
            return false;
        }

        self.fetcher.has_recent_data().await
    }

    pub async fn fetch_status(&self) -> Result<FetchStatus> {
        let state = self.fetcher.state().await;
        Ok(FetchStatus {
            in_progress: state.in_progress,
            last_successful_fetch: state.last_successful_fetch,
            latest_run: self.fetcher.latest_run().await?,
        })
    }
}

#[async_trait]
impl IdResolver for ResolutionService {
    async fn resolve_batch(&self, items: Vec<ResolveRequestItem>) -> Result<Vec<ResolveResponseItem>> {
        Ok(self.resolve(&items).await)
    }
}
