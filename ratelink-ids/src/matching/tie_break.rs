//! One-to-one assignment of canonical IDs among competing internal IDs

use std::collections::{BTreeMap, HashSet};

/// A proposed canonical ID with its confidence
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub canonical_id: String,
    pub confidence: f64,
}

/// Greedily assign canonical IDs so that each one is used at most once
///
/// Internal IDs are visited in lexical order; each takes its highest
/// confidence candidate (the first one on ties). An internal ID with no
/// candidates, or whose best candidate is already taken, is unresolved.
pub fn resolve_conflicts(
    candidates: &BTreeMap<String, Vec<Candidate>>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut resolved = BTreeMap::new();
    let mut unresolved = Vec::new();
    let mut taken: HashSet<&str> = HashSet::new();

    for (internal_id, options) in candidates {
        let best = options.iter().fold(None::<&Candidate>, |best, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        });

        match best {
            Some(c) if taken.insert(c.canonical_id.as_str()) => {
                resolved.insert(internal_id.clone(), c.canonical_id.clone());
            }
            _ => unresolved.push(internal_id.clone()),
        }
    }

    (resolved, unresolved)
}
