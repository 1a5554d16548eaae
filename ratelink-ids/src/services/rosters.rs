//! Cached registry rosters keyed by `program:listKind:listID`

use crate::cache::LayeredCache;
use crate::config::ProgramConfig;
use crate::matching::RosterSet;
use crate::registry::{RegistryApplicant, RosterKind};

/// Roster cache shared by the fetcher (writer) and the resolver (reader)
#[derive(Clone)]
pub struct RosterCache {
    cache: LayeredCache<Vec<RegistryApplicant>>,
}

impl RosterCache {
    pub fn new(cache: LayeredCache<Vec<RegistryApplicant>>) -> Self {
        Self { cache }
    }

    pub fn key(program: &str, kind: RosterKind, list_id: &str) -> String {
        format!("{}:{}:{}", program, kind.as_str(), list_id)
    }

    pub async fn store(&self, program: &str, kind: RosterKind, list_id: &str, applicants: Vec<RegistryApplicant>) {
        self.cache.set(&Self::key(program, kind, list_id), applicants).await;
    }

    /// Everything cached for the configured programs, converted for matching
    pub async fn load_all(&self, programs: &[ProgramConfig]) -> RosterSet {
        let mut set = RosterSet::new();

        for program in programs {
            for (kind, list_id) in program.lists() {
                let Some(rows) = self.cache.get(&Self::key(&program.name, kind, list_id)).await else {
                    continue;
                };
                set.entry(program.name.clone())
                    .or_default()
                    .insert(kind, rows.iter().map(RegistryApplicant::to_external).collect());
            }
        }

        set
    }

    /// Whether at least one configured list has cached data
    pub async fn has_any(&self, programs: &[ProgramConfig]) -> bool {
        for program in programs {
            for (kind, list_id) in program.lists() {
                if self.cache.get(&Self::key(&program.name, kind, list_id)).await.is_some() {
                    return true;
                }
            }
        }
        false
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}
