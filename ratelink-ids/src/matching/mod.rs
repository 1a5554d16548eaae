//! Matching of internal applicants against the national registry
//!
//! Everything in here is synchronous and pure: the engine receives a
//! snapshot of the rosters and a batch of requests and returns one
//! [`MatchResult`] per internal ID.

pub mod bvi;
pub mod engine;
pub mod scoring;
pub mod tie_break;

pub use bvi::match_bvi;
pub use engine::{MatchingEngine, RosterSet};
pub use tie_break::{resolve_conflicts, Candidate};

use ratelink_common::{fallback_id, Competition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Program or competition label used when the request carried no applications
pub const UNKNOWN: &str = "Unknown";

/// Internal applicant as seen by the BVI primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalApplicant {
    pub internal_id: String,
    pub rating_place: i32,
}

/// One row of a registry roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalApplicant {
    pub canonical_id: String,
    /// Position in the published rating list
    pub rating: i32,
    /// Applicant's declared priority for this program
    pub priority: i32,
    pub score_sum: f64,
    /// Positive exam results only
    pub exam_scores: Vec<f64>,
    /// Admitted without entrance exams (BVI)
    pub without_exams: bool,
    pub status_code: i32,
}

/// How a canonical ID was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "BVI")]
    Bvi,
    Strong,
    Weak,
    Fallback,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Bvi => "BVI",
            MatchType::Strong => "Strong",
            MatchType::Weak => "Weak",
            MatchType::Fallback => "Fallback",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = ratelink_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BVI" => Ok(MatchType::Bvi),
            "Strong" => Ok(MatchType::Strong),
            "Weak" => Ok(MatchType::Weak),
            "Fallback" => Ok(MatchType::Fallback),
            other => Err(ratelink_common::Error::InvalidInput(format!(
                "unknown match type: {}",
                other
            ))),
        }
    }
}

/// Final resolution of one internal ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub internal_id: String,
    pub canonical_id: String,
    pub confidence: f64,
    pub match_type: MatchType,
    pub program_name: String,
    /// `None` when the request carried no applications
    pub competition_type: Option<Competition>,
}

impl MatchResult {
    /// Deterministic fallback identity
    pub fn fallback(
        internal_id: &str,
        program_name: &str,
        competition_type: Option<Competition>,
    ) -> Self {
        Self {
            internal_id: internal_id.to_string(),
            canonical_id: fallback_id(internal_id),
            confidence: 0.0,
            match_type: MatchType::Fallback,
            program_name: program_name.to_string(),
            competition_type,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.match_type == MatchType::Fallback
    }

    /// Competition label as stored and logged
    pub fn competition_label(&self) -> &'static str {
        self.competition_type.map(|c| c.as_str()).unwrap_or(UNKNOWN)
    }
}
