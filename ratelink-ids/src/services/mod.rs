//! Service layer: roster cache, background fetcher, resolution facade

pub mod fetcher;
pub mod resolver;
pub mod rosters;

pub use fetcher::{FetchOutcome, FetchState, Fetcher};
pub use resolver::{FetchStatus, ResolutionService};
pub use rosters::RosterCache;

use ratelink_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::cache::LayeredCache;
use crate::config::ServiceConfig;
use crate::db::{SqliteKvStore, SqliteMatchStore};
use crate::matching::MatchResult;
use crate::registry::{RegistryApplicant, RosterSource};
use crate::utils::Sleeper;

/// Build the caches, fetcher and facade over one database pool
///
/// Fetcher state is restored from the database; the periodic loop is not
/// started (see [`Fetcher::start`]).
pub async fn build_services(
    config: &ServiceConfig,
    pool: SqlitePool,
    source: Arc<dyn RosterSource>,
    sleeper: Arc<dyn Sleeper>,
) -> Result<Arc<ResolutionService>> {
    let rosters = RosterCache::new(LayeredCache::new(
        config.memory_ttl,
        Arc::new(SqliteKvStore::<Vec<RegistryApplicant>>::new(pool.clone(), config.max_lock_wait_ms)),
    ));
    let match_store = Arc::new(SqliteMatchStore::new(pool.clone(), config.max_lock_wait_ms));
    let matches: LayeredCache<MatchResult> = LayeredCache::new(config.memory_ttl, match_store.clone());

    let fetcher = Arc::new(Fetcher::new(
        pool,
        config,
        source,
        rosters.clone(),
        matches.clone(),
        sleeper,
    ));
    fetcher.restore_state().await?;

    Ok(Arc::new(ResolutionService::new(
        Arc::new(config.programs.clone()),
        rosters,
        matches,
        match_store,
        fetcher,
    )))
}
