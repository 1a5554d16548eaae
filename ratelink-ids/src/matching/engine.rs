//! Batch matching of internal applicants against cached rosters
//!
//! Programs are processed in lexical order. Within a program, BVI
//! applicants are paired by rank first, then each scored competition type
//! runs a Strong pass (best-scoring candidate above the threshold) and a
//! Weak pass (positional pairing of what is left). Whatever remains gets a
//! fallback identity.
//!
//! A canonical ID accepted for a non-DedicatedQuota match is reserved for
//! that internal ID; DedicatedQuota may map several internal IDs onto one
//! canonical ID.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ratelink_common::{AppDetails, Competition, ResolveRequestItem};
use tracing::{debug, info, warn};

use super::scoring::{strong_score, to_confidence, weak_score, ProgramPriorities, STRONG_THRESHOLD};
use super::{
    match_bvi, resolve_conflicts, Candidate, ExternalApplicant, InternalApplicant, MatchResult,
    MatchType, UNKNOWN,
};
use crate::registry::RosterKind;

/// Rosters of one program by list kind
pub type ProgramRosters = BTreeMap<RosterKind, Vec<ExternalApplicant>>;

/// Rosters of every configured program, keyed by program name
pub type RosterSet = BTreeMap<String, ProgramRosters>;

/// One application of one internal ID
struct Entry<'r> {
    internal_id: &'r str,
    app: &'r AppDetails,
    all_apps: &'r [AppDetails],
}

/// Matching state for one batch
pub struct MatchingEngine<'a> {
    rosters: &'a RosterSet,
    /// Canonical ID to its priorities in every program it appears in
    priority_index: HashMap<&'a str, ProgramPriorities>,
    results: HashMap<String, MatchResult>,
    /// Canonical ID to internal IDs holding it through a one-to-one match
    holders: HashMap<String, BTreeSet<String>>,
}

/// Whether a result reserves its canonical ID
fn reserves_canonical(result: &MatchResult) -> bool {
    !result.is_fallback() && !result.competition_type.is_some_and(|c| c.is_many_to_one())
}

fn candidates_for(lists: &ProgramRosters, competition: Competition) -> Vec<&ExternalApplicant> {
    let Some(list) = lists.get(&RosterKind::for_competition(competition)) else {
        return Vec::new();
    };

    match competition {
        Competition::Regular => list.iter().filter(|c| !c.without_exams).collect(),
        Competition::Bvi => list.iter().filter(|c| c.without_exams).collect(),
        _ => list.iter().collect(),
    }
}

impl<'a> MatchingEngine<'a> {
    pub fn new(rosters: &'a RosterSet) -> Self {
        let mut priority_index: HashMap<&'a str, ProgramPriorities> = HashMap::new();
        for (program, lists) in rosters {
            for row in lists.values().flatten() {
                priority_index
                    .entry(row.canonical_id.as_str())
                    .or_default()
                    .entry(program.clone())
                    .or_insert(row.priority);
            }
        }

        Self {
            rosters,
            priority_index,
            results: HashMap::new(),
            holders: HashMap::new(),
        }
    }

    /// Treat `canonical_id` as already held by `internal_id`
    ///
    /// Used for one-to-one matches handed out by earlier batches, so a new
    /// batch never gives the same canonical ID to someone else.
    pub fn with_reserved<I>(mut self, reserved: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (canonical_id, internal_id) in reserved {
            self.holders.entry(canonical_id).or_default().insert(internal_id);
        }
        self
    }

    /// Match a batch; returns one result per distinct internal ID in
    /// first-appearance order
    pub fn execute(mut self, requests: &[ResolveRequestItem]) -> Vec<MatchResult> {
        let mut order: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut by_program: BTreeMap<&str, Vec<Entry<'_>>> = BTreeMap::new();

        for item in requests {
            if seen.insert(item.internal_id.as_str()) {
                order.push(item.internal_id.as_str());
            }
            for app in &item.apps {
                by_program
                    .entry(app.pretty_name.as_str())
                    .or_default()
                    .push(Entry {
                        internal_id: item.internal_id.as_str(),
                        app,
                        all_apps: &item.apps,
                    });
            }
        }

        for (program, entries) in &by_program {
            self.process_program(program, entries);
        }

        let mut results: Vec<MatchResult> = order
            .iter()
            .map(|id| {
                self.results
                    .remove(*id)
                    .unwrap_or_else(|| MatchResult::fallback(id, UNKNOWN, None))
            })
            .collect();

        enforce_unique_canonical(&mut results);
        log_summary(&results);
        results
    }

    fn process_program(&mut self, program: &str, entries: &[Entry<'_>]) {
        let rosters = self.rosters;
        let Some(lists) = rosters.get(program) else {
            warn!(
                program,
                entries = entries.len(),
                "No roster for program, assigning fallback identities"
            );
            for entry in entries {
                self.propose(MatchResult::fallback(
                    entry.internal_id,
                    program,
                    Some(entry.app.competition()),
                ));
            }
            return;
        };

        let bvi: Vec<&Entry<'_>> = entries
            .iter()
            .filter(|e| e.app.competition() == Competition::Bvi)
            .collect();
        if !bvi.is_empty() {
            self.match_bvi_entries(program, lists, &bvi);
        }

        for competition in Competition::SCORED_ORDER {
            let group: Vec<&Entry<'_>> = entries
                .iter()
                .filter(|e| e.app.competition() == competition)
                .collect();
            if group.is_empty() {
                continue;
            }

            let candidates = candidates_for(lists, competition);
            if candidates.is_empty() {
                warn!(
                    program,
                    competition = %competition,
                    entries = group.len(),
                    "No roster for competition type, assigning fallback identities"
                );
                for entry in group {
                    self.propose(MatchResult::fallback(entry.internal_id, program, Some(competition)));
                }
                continue;
            }

            self.match_scored(program, competition, group, candidates);
        }
    }

    fn match_bvi_entries(&mut self, program: &str, lists: &ProgramRosters, group: &[&Entry<'_>]) {
        let internal: Vec<InternalApplicant> = group
            .iter()
            .map(|e| InternalApplicant {
                internal_id: e.internal_id.to_string(),
                rating_place: e.app.rating_place,
            })
            .collect();
        let external: Vec<ExternalApplicant> = candidates_for(lists, Competition::Bvi)
            .into_iter()
            .filter(|c| self.is_available(&c.canonical_id, None, Competition::Bvi))
            .cloned()
            .collect();

        let (mapping, all_matched) = match_bvi(&internal, &external);
        if !all_matched {
            debug!(
                program,
                internal = internal.len(),
                external = external.len(),
                "Not every BVI applicant found a partner"
            );
        }

        for entry in group {
            let result = match mapping.get(entry.internal_id) {
                Some(canonical_id) => MatchResult {
                    internal_id: entry.internal_id.to_string(),
                    canonical_id: canonical_id.clone(),
                    confidence: 1.0,
                    match_type: MatchType::Bvi,
                    program_name: program.to_string(),
                    competition_type: Some(Competition::Bvi),
                },
                None => MatchResult::fallback(entry.internal_id, program, Some(Competition::Bvi)),
            };
            self.propose(result);
        }
    }

    fn match_scored(
        &mut self,
        program: &str,
        competition: Competition,
        mut group: Vec<&Entry<'_>>,
        mut candidates: Vec<&ExternalApplicant>,
    ) {
        group.sort_by(|a, b| {
            a.app
                .rating_place
                .cmp(&b.app.rating_place)
                .then_with(|| a.internal_id.cmp(b.internal_id))
        });
        candidates.sort_by(|a, b| {
            a.rating
                .cmp(&b.rating)
                .then_with(|| a.canonical_id.cmp(&b.canonical_id))
        });
        let mut used = vec![false; candidates.len()];

        // Strong pass
        for entry in &group {
            if self.has_confidence(entry.internal_id, STRONG_THRESHOLD) {
                continue;
            }

            let mut best: Option<(usize, u32)> = None;
            for (idx, candidate) in candidates.iter().enumerate() {
                if used[idx] || !self.is_available(&candidate.canonical_id, Some(entry.internal_id), competition) {
                    continue;
                }
                let points = strong_score(
                    entry.app,
                    entry.all_apps,
                    candidate,
                    self.priority_index.get(candidate.canonical_id.as_str()),
                );
                if points >= STRONG_THRESHOLD && best.map_or(true, |(_, b)| points > b) {
                    best = Some((idx, points));
                }
            }

            if let Some((idx, points)) = best {
                used[idx] = true;
                self.propose(MatchResult {
                    internal_id: entry.internal_id.to_string(),
                    canonical_id: candidates[idx].canonical_id.clone(),
                    confidence: to_confidence(points),
                    match_type: MatchType::Strong,
                    program_name: program.to_string(),
                    competition_type: Some(competition),
                });
            }
        }

        // Weak pass: positional pairing of what is left
        let remaining: Vec<&Entry<'_>> = group
            .iter()
            .copied()
            .filter(|e| !self.has_identity(e.internal_id))
            .collect();
        let free: Vec<&ExternalApplicant> = candidates
            .iter()
            .zip(&used)
            .filter(|(c, used)| !**used && self.is_available(&c.canonical_id, None, competition))
            .map(|(c, _)| *c)
            .collect();

        for (pos, entry) in remaining.iter().enumerate() {
            let result = match free.get(pos) {
                Some(candidate) => MatchResult {
                    internal_id: entry.internal_id.to_string(),
                    canonical_id: candidate.canonical_id.clone(),
                    confidence: to_confidence(weak_score(entry.app, candidate)),
                    match_type: MatchType::Weak,
                    program_name: program.to_string(),
                    competition_type: Some(competition),
                },
                None => MatchResult::fallback(entry.internal_id, program, Some(competition)),
            };
            self.propose(result);
        }
    }

    /// Whether `canonical_id` may be assigned to `internal_id` (`None`: to
    /// anyone not yet holding it)
    fn is_available(&self, canonical_id: &str, internal_id: Option<&str>, competition: Competition) -> bool {
        if competition.is_many_to_one() {
            return true;
        }
        match self.holders.get(canonical_id) {
            None => true,
            Some(holders) => holders.iter().all(|h| Some(h.as_str()) == internal_id),
        }
    }

    fn has_confidence(&self, internal_id: &str, points: u32) -> bool {
        self.results
            .get(internal_id)
            .is_some_and(|r| r.confidence >= to_confidence(points))
    }

    fn has_identity(&self, internal_id: &str) -> bool {
        self.results.get(internal_id).is_some_and(|r| !r.is_fallback())
    }

    /// Keep `result` if it beats the current one; ties keep the earlier
    fn propose(&mut self, result: MatchResult) {
        if let Some(existing) = self.results.get(&result.internal_id) {
            if result.confidence <= existing.confidence {
                return;
            }
            if reserves_canonical(existing) {
                if let Some(holders) = self.holders.get_mut(&existing.canonical_id) {
                    holders.remove(&existing.internal_id);
                }
            }
        }

        if reserves_canonical(&result) {
            self.holders
                .entry(result.canonical_id.clone())
                .or_default()
                .insert(result.internal_id.clone());
        }

        debug!(
            internal_id = %result.internal_id,
            canonical_id = %result.canonical_id,
            confidence = result.confidence,
            match_type = %result.match_type,
            program = %result.program_name,
            competition = result.competition_label(),
            "Match accepted"
        );
        self.results.insert(result.internal_id.clone(), result);
    }
}

/// Downgrade to fallback any one-to-one result whose canonical ID is also
/// claimed by a lexically earlier internal ID
fn enforce_unique_canonical(results: &mut [MatchResult]) {
    let contested: BTreeMap<String, Vec<Candidate>> = results
        .iter()
        .filter(|r| reserves_canonical(r))
        .map(|r| {
            (
                r.internal_id.clone(),
                vec![Candidate {
                    canonical_id: r.canonical_id.clone(),
                    confidence: r.confidence,
                }],
            )
        })
        .collect();

    let (_, unresolved) = resolve_conflicts(&contested);
    if unresolved.is_empty() {
        return;
    }

    warn!(count = unresolved.len(), "Canonical ID conflicts resolved by fallback");
    let unresolved: HashSet<String> = unresolved.into_iter().collect();
    for result in results.iter_mut() {
        if unresolved.contains(&result.internal_id) {
            *result = MatchResult::fallback(
                &result.internal_id,
                &result.program_name,
                result.competition_type,
            );
        }
    }
}

fn log_summary(results: &[MatchResult]) {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for result in results {
        *counts.entry(result.match_type.as_str()).or_default() += 1;
    }

    info!(
        total = results.len(),
        bvi = counts.get("BVI").copied().unwrap_or(0),
        strong = counts.get("Strong").copied().unwrap_or(0),
        weak = counts.get("Weak").copied().unwrap_or(0),
        fallback = counts.get("Fallback").copied().unwrap_or(0),
        "Matching finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, rating: i32, priority: i32, exams: &[f64], without_exams: bool) -> ExternalApplicant {
        ExternalApplicant {
            canonical_id: id.to_string(),
            rating,
            priority,
            score_sum: exams.iter().sum(),
            exam_scores: exams.to_vec(),
            without_exams,
            status_code: 1,
        }
    }

    fn app(program: &str, place: i32, priority: i32, exams: &[i32], competition: Competition) -> AppDetails {
        AppDetails {
            pretty_name: program.to_string(),
            score_sum: exams.iter().sum(),
            rating_place: place,
            priority,
            ege_scores: exams.to_vec(),
            competition_type: Some(competition),
            ..Default::default()
        }
    }

    fn request(id: &str, apps: Vec<AppDetails>) -> ResolveRequestItem {
        ResolveRequestItem {
            internal_id: id.to_string(),
            apps,
        }
    }

    fn rosters(program: &str, kind: RosterKind, rows: Vec<ExternalApplicant>) -> RosterSet {
        let mut lists = ProgramRosters::new();
        lists.insert(kind, rows);
        let mut set = RosterSet::new();
        set.insert(program.to_string(), lists);
        set
    }

    #[test]
    fn test_bvi_pairs_by_rank() {
        let set = rosters(
            "Math",
            RosterKind::RegularBvi,
            vec![
                row("X", 1, 1, &[], true),
                row("Y", 2, 1, &[], true),
                row("R", 3, 1, &[90.0], false),
            ],
        );
        let requests = vec![
            request("A", vec![app("Math", 2, 1, &[], Competition::Bvi)]),
            request("B", vec![app("Math", 1, 1, &[], Competition::Bvi)]),
        ];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results[0].internal_id, "A");
        assert_eq!(results[0].canonical_id, "Y");
        assert_eq!(results[1].canonical_id, "X");
        assert!(results.iter().all(|r| r.match_type == MatchType::Bvi && r.confidence == 1.0));
    }

    #[test]
    fn test_strong_matches_in_rank_order() {
        let set = rosters(
            "Math",
            RosterKind::RegularBvi,
            vec![row("X", 1, 1, &[90.0, 80.0], false), row("Y", 2, 1, &[90.0, 80.0], false)],
        );
        let requests = vec![
            request("A", vec![app("Math", 1, 1, &[80, 90], Competition::Regular)]),
            request("B", vec![app("Math", 2, 1, &[80, 90], Competition::Regular)]),
        ];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results[0].canonical_id, "X");
        assert_eq!(results[1].canonical_id, "Y");
        for r in &results {
            assert_eq!(r.match_type, MatchType::Strong);
            assert!(r.confidence >= 0.8);
        }
    }

    #[test]
    fn test_reserved_canonical_not_reassigned() {
        let set = rosters(
            "Math",
            RosterKind::RegularBvi,
            vec![row("X", 1, 1, &[90.0], false), row("Y", 2, 1, &[70.0], false)],
        );
        let requests = vec![request("B", vec![app("Math", 1, 1, &[90], Competition::Regular)])];

        let results = MatchingEngine::new(&set)
            .with_reserved(vec![("X".to_string(), "A".to_string())])
            .execute(&requests);

        // X would be a strong match, but A holds it from an earlier batch
        assert_eq!(results[0].canonical_id, "Y");
        assert_eq!(results[0].match_type, MatchType::Weak);
    }

    #[test]
    fn test_reserved_canonical_keeps_its_holder() {
        let set = rosters("Math", RosterKind::RegularBvi, vec![row("X", 1, 1, &[90.0], false)]);
        let requests = vec![request("A", vec![app("Math", 1, 1, &[90], Competition::Regular)])];

        let results = MatchingEngine::new(&set)
            .with_reserved(vec![("X".to_string(), "A".to_string())])
            .execute(&requests);

        assert_eq!(results[0].canonical_id, "X");
    }

    #[test]
    fn test_weak_pass_and_fallback_remainder() {
        let set = rosters(
            "Math",
            RosterKind::RegularBvi,
            vec![row("X", 1, 3, &[50.0], false)],
        );
        let requests = vec![
            request("A", vec![app("Math", 1, 1, &[90], Competition::Regular)]),
            request("B", vec![app("Math", 2, 1, &[91], Competition::Regular)]),
        ];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results[0].match_type, MatchType::Weak);
        assert_eq!(results[0].canonical_id, "X");
        assert_eq!(results[0].confidence, 0.4);
        assert_eq!(results[1].match_type, MatchType::Fallback);
        assert_eq!(results[1].canonical_id, "MSU-B");
    }

    #[test]
    fn test_missing_program_yields_fallback() {
        let set = rosters("Math", RosterKind::RegularBvi, vec![row("X", 1, 1, &[], false)]);
        let requests = vec![request("A", vec![app("Physics", 1, 1, &[], Competition::Regular)])];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].canonical_id, "MSU-A");
        assert_eq!(results[0].program_name, "Physics");
        assert_eq!(results[0].confidence, 0.0);
    }

    #[test]
    fn test_request_without_apps_is_unknown_fallback() {
        let set = RosterSet::new();
        let results = MatchingEngine::new(&set).execute(&[request("A", Vec::new())]);

        assert_eq!(results[0].program_name, UNKNOWN);
        assert_eq!(results[0].competition_type, None);
        assert!(results[0].is_fallback());
    }

    #[test]
    fn test_dedicated_quota_may_share_canonical() {
        let mut lists = ProgramRosters::new();
        lists.insert(RosterKind::RegularBvi, vec![row("X", 1, 1, &[90.0], false)]);
        lists.insert(RosterKind::DedicatedQuota, vec![row("X", 1, 1, &[90.0], false)]);
        let mut set = RosterSet::new();
        set.insert("Math".to_string(), lists);

        let requests = vec![
            request("A", vec![app("Math", 1, 1, &[90], Competition::Regular)]),
            request("B", vec![app("Math", 1, 1, &[90], Competition::DedicatedQuota)]),
        ];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results[0].canonical_id, "X");
        assert_eq!(results[1].canonical_id, "X");
        assert_eq!(results[1].match_type, MatchType::Strong);
    }

    #[test]
    fn test_canonical_reserved_across_competition_types() {
        // X is published both in the regular and the special quota list
        let mut lists = ProgramRosters::new();
        lists.insert(RosterKind::RegularBvi, vec![row("X", 1, 1, &[90.0], false)]);
        lists.insert(RosterKind::SpecialQuota, vec![row("X", 1, 1, &[90.0], false)]);
        let mut set = RosterSet::new();
        set.insert("Math".to_string(), lists);

        let requests = vec![
            request("A", vec![app("Math", 1, 1, &[90], Competition::Regular)]),
            request("B", vec![app("Math", 1, 1, &[90], Competition::SpecialQuota)]),
        ];

        let results = MatchingEngine::new(&set).execute(&requests);

        assert_eq!(results[0].canonical_id, "X");
        assert!(results[1].is_fallback());
    }

    #[test]
    fn test_results_are_deterministic() {
        let set = rosters(
            "Math",
            RosterKind::RegularBvi,
            vec![
                row("X", 1, 1, &[70.0], false),
                row("Y", 1, 1, &[70.0], false),
                row("Z", 2, 2, &[60.0], false),
            ],
        );
        let requests = vec![
            request("C", vec![app("Math", 1, 1, &[70], Competition::Regular)]),
            request("A", vec![app("Math", 1, 1, &[70], Competition::Regular)]),
            request("B", vec![app("Math", 3, 2, &[10], Competition::Regular)]),
        ];

        let first = MatchingEngine::new(&set).execute(&requests);
        let second = MatchingEngine::new(&set).execute(&requests);
        assert_eq!(first, second);

        let a = first.iter().find(|r| r.internal_id == "A").unwrap();
        let c = first.iter().find(|r| r.internal_id == "C").unwrap();
        assert_eq!(a.canonical_id, "X");
        assert_eq!(c.canonical_id, "Y");
    }
}
