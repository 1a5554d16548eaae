//! Candidate scoring for the Strong and Weak passes
//!
//! Scores are kept in integer hundredths so the acceptance threshold is an
//! exact comparison.

use std::collections::BTreeMap;

use ratelink_common::AppDetails;

use super::ExternalApplicant;

/// Minimum Strong score (hundredths) for acceptance
pub const STRONG_THRESHOLD: u32 = 80;

const PRIORITY_ORDER_POINTS: u32 = 50;
const EXAM_POINTS: u32 = 30;
const SAME_PRIORITY_POINTS: u32 = 20;

const WEAK_BASE_POINTS: u32 = 40;
const WEAK_EXAM_POINTS: u32 = 10;
const WEAK_PRIORITY_POINTS: u32 = 10;

/// Program name to declared priority, for one canonical ID across all rosters
pub type ProgramPriorities = BTreeMap<String, i32>;

/// Convert hundredths to a confidence in `[0, 1]`
pub fn to_confidence(points: u32) -> f64 {
    f64::from(points.min(100)) / 100.0
}

/// Order-independent exact comparison of exam results
pub fn exam_scores_match(internal: &[i32], external: &[f64]) -> bool {
    if internal.len() != external.len() {
        return false;
    }

    let mut ours: Vec<f64> = internal.iter().map(|&s| f64::from(s)).collect();
    let mut theirs = external.to_vec();
    ours.sort_by(f64::total_cmp);
    theirs.sort_by(f64::total_cmp);

    ours == theirs
}

/// Whether the applicant's priority order agrees with the candidate's
///
/// Only programs where both sides applied are compared. Ordered by the
/// applicant's priorities, both sequences must be strictly increasing;
/// gaps are allowed on either side.
pub fn priorities_consistent(apps: &[AppDetails], candidate: &ProgramPriorities) -> bool {
    let mut ours: BTreeMap<&str, i32> = BTreeMap::new();
    for app in apps {
        ours.entry(app.pretty_name.as_str()).or_insert(app.priority);
    }

    let mut shared: Vec<(i32, i32)> = ours
        .iter()
        .filter_map(|(program, &p)| candidate.get(*program).map(|&q| (p, q)))
        .collect();

    if shared.is_empty() {
        return false;
    }

    shared.sort_unstable();
    shared
        .windows(2)
        .all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1)
}

/// Strong score in hundredths for one application against one candidate
///
/// `all_apps` are every application of the same internal ID, used for the
/// cross-program priority check.
pub fn strong_score(
    app: &AppDetails,
    all_apps: &[AppDetails],
    candidate: &ExternalApplicant,
    candidate_priorities: Option<&ProgramPriorities>,
) -> u32 {
    let mut points = 0;

    if candidate_priorities.is_some_and(|p| priorities_consistent(all_apps, p)) {
        points += PRIORITY_ORDER_POINTS;
    }
    if exam_scores_match(&app.ege_scores, &candidate.exam_scores) {
        points += EXAM_POINTS;
    }
    if app.priority == candidate.priority {
        points += SAME_PRIORITY_POINTS;
    }

    points
}

/// Weak confidence in hundredths for a positional pairing
pub fn weak_score(app: &AppDetails, candidate: &ExternalApplicant) -> u32 {
    let mut points = WEAK_BASE_POINTS;

    if exam_scores_match(&app.ege_scores, &candidate.exam_scores) {
        points += WEAK_EXAM_POINTS;
    }
    if app.priority == candidate.priority {
        points += WEAK_PRIORITY_POINTS;
    }

    points
}
