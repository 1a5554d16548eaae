//! Internal ID extraction and fallback identities
//!
//! The university's rating lists print a noisy applicant number. The same
//! applicant is printed with extra leading digits on most lists but with a
//! short number on the dedicated quota list, so the join key is derived
//! differently for the two cases.

use crate::Competition;

/// Marker prefix of every fallback canonical ID. Registry IDs are purely numeric.
pub const FALLBACK_PREFIX: &str = "MSU-";

const INTERNAL_ID_DIGITS: usize = 6;

/// Derive the internal join key from a raw rating-list identifier.
///
/// Non-digits are stripped. For `DedicatedQuota` the full digit string is
/// left-padded with zeros to six digits and never truncated; for every
/// other type the last six digits are kept, zero-padded when shorter.
pub fn extract_internal_id(raw_id: &str, competition: Competition) -> String {
    let digits: String = raw_id.chars().filter(|c| c.is_ascii_digit()).collect();

    if competition.is_many_to_one() || digits.len() < INTERNAL_ID_DIGITS {
        return format!("{:0>width$}", digits, width = INTERNAL_ID_DIGITS);
    }

    digits[digits.len() - INTERNAL_ID_DIGITS..].to_string()
}

/// Deterministic placeholder canonical ID for an internal ID without a match
pub fn fallback_id(internal_id: &str) -> String {
    format!("{}{}", FALLBACK_PREFIX, internal_id)
}

/// True if the canonical ID was produced by [`fallback_id`]
pub fn is_fallback_id(canonical_id: &str) -> bool {
    canonical_id.starts_with(FALLBACK_PREFIX)
}
