//! Rank-order pairing for applicants admitted without entrance exams
//!
//! BVI applicants carry no exam scores, so the only signal is their order
//! in the rating list. Both sides are sorted by rating and paired
//! index-for-index.

use std::collections::BTreeMap;

use super::{ExternalApplicant, InternalApplicant};

/// Pair internal and external BVI applicants by rating order
///
/// Returns the internal-to-canonical mapping and whether every internal
/// applicant received a partner. Rating ties are broken by internal ID and
/// canonical ID so the pairing is reproducible.
pub fn match_bvi(
    internal: &[InternalApplicant],
    external: &[ExternalApplicant],
) -> (BTreeMap<String, String>, bool) {
    let mut internal_sorted: Vec<&InternalApplicant> = internal.iter().collect();
    internal_sorted.sort_by(|a, b| {
        a.rating_place
            .cmp(&b.rating_place)
            .then_with(|| a.internal_id.cmp(&b.internal_id))
    });

    let mut external_sorted: Vec<&ExternalApplicant> = external.iter().collect();
    external_sorted.sort_by(|a, b| {
        a.rating
            .cmp(&b.rating)
            .then_with(|| a.canonical_id.cmp(&b.canonical_id))
    });

    let mapping: BTreeMap<String, String> = internal_sorted
        .iter()
        .zip(external_sorted.iter())
        .map(|(i, e)| (i.internal_id.clone(), e.canonical_id.clone()))
        .collect();

    let all_matched = internal_sorted.len() <= external_sorted.len();
    (mapping, all_matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(id: &str, place: i32) -> InternalApplicant {
        InternalApplicant {
            internal_id: id.to_string(),
            rating_place: place,
        }
    }

    fn external(id: &str, rating: i32) -> ExternalApplicant {
        ExternalApplicant {
            canonical_id: id.to_string(),
            rating,
            priority: 1,
            score_sum: 0.0,
            exam_scores: Vec::new(),
            without_exams: true,
            status_code: 0,
        }
    }

    #[test]
    fn test_pairs_by_rank() {
        let (mapping, all) = match_bvi(
            &[internal("A", 2), internal("B", 1)],
            &[external("X", 1), external("Y", 2)],
        );

        assert!(all);
        assert_eq!(mapping["B"], "X");
        assert_eq!(mapping["A"], "Y");
    }

    #[test]
    fn test_more_internal_than_external() {
        let (mapping, all) = match_bvi(
            &[internal("A", 1), internal("B", 2), internal("C", 3)],
            &[external("X", 1)],
        );

        assert!(!all);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["A"], "X");
    }

    #[test]
    fn test_empty_sides() {
        let (mapping, all) = match_bvi(&[], &[external("X", 1)]);
        assert!(mapping.is_empty());
        assert!(all);

        let (mapping, all) = match_bvi(&[internal("A", 1)], &[]);
        assert!(mapping.is_empty());
        assert!(!all);
    }

    #[test]
    fn test_rating_ties_use_identifiers() {
        let (mapping, _) = match_bvi(
            &[internal("B", 1), internal("A", 1)],
            &[external("Y", 1), external("X", 1)],
        );

        assert_eq!(mapping["A"], "X");
        assert_eq!(mapping["B"], "Y");
    }
}
