//! Scraper record types
//!
//! Records pushed by the per-university loaders. The resolution core treats
//! them as opaque input apart from the identifier and the fields forwarded
//! to the resolver.

use serde::{Deserialize, Serialize};

use crate::Competition;

/// Number of places per admission channel of one heading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacities {
    pub regular: u32,
    pub target_quota: u32,
    pub dedicated_quota: u32,
    pub special_quota: u32,
}

/// One program ("heading") of a university
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingData {
    /// Unique code for the heading
    pub code: String,
    /// Places available in this heading
    pub capacities: Capacities,
    /// Human-readable program name
    pub pretty_name: String,
}

/// One application row from a rating list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationData {
    pub heading_code: String,
    /// Applicant identifier; raw local ID on input, canonical ID after resolution
    pub student_id: String,
    pub scores_sum: i32,
    pub rating_place: i32,
    pub priority: i32,
    pub competition_type: Competition,
    pub original_submitted: bool,
    /// Score of the university's own entrance exam
    pub dvi_score: i32,
    /// Individual national exam results
    pub ege_scores: Vec<i32>,
    /// Program name as printed on the list
    pub heading_name: String,
}
