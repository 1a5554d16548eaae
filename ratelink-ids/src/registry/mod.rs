//! National admissions registry: wire types and roster list kinds

pub mod client;

pub use client::{FetchError, RegistryClient, RosterSource};

use ratelink_common::Competition;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::matching::ExternalApplicant;

/// The four lists the registry publishes per program
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RosterKind {
    /// Regular and BVI applicants together, told apart by `withoutTests`
    #[serde(rename = "RegularBVI")]
    RegularBvi,
    SpecialQuota,
    TargetQuota,
    DedicatedQuota,
}

impl RosterKind {
    pub const ALL: [RosterKind; 4] = [
        RosterKind::RegularBvi,
        RosterKind::SpecialQuota,
        RosterKind::TargetQuota,
        RosterKind::DedicatedQuota,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RosterKind::RegularBvi => "RegularBVI",
            RosterKind::SpecialQuota => "SpecialQuota",
            RosterKind::TargetQuota => "TargetQuota",
            RosterKind::DedicatedQuota => "DedicatedQuota",
        }
    }

    /// List a competition's candidates are published in
    pub fn for_competition(competition: Competition) -> Self {
        match competition {
            Competition::Regular | Competition::Bvi => RosterKind::RegularBvi,
            Competition::SpecialQuota => RosterKind::SpecialQuota,
            Competition::TargetQuota => RosterKind::TargetQuota,
            Competition::DedicatedQuota => RosterKind::DedicatedQuota,
        }
    }
}

impl fmt::Display for RosterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a JSON `null` the same as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One applicant row as published by the registry
///
/// Only fields the matcher uses (plus a few useful for logging) are kept;
/// the registry sends nulls freely, so a missing key and a `null` both
/// read as the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryApplicant {
    #[serde(deserialize_with = "null_as_default")]
    pub rating: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub priority: i32,
    pub consent: Option<String>,
    pub sum_mark: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub without_tests: bool,
    pub result1: Option<f64>,
    pub result2: Option<f64>,
    pub result3: Option<f64>,
    pub result4: Option<f64>,
    pub result5: Option<f64>,
    pub result6: Option<f64>,
    pub result7: Option<f64>,
    pub result8: Option<f64>,
    pub achievements_mark: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub status_id: i32,
    pub status_name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub id_application: i64,
}

impl RegistryApplicant {
    /// Positive exam results in column order
    pub fn exam_scores(&self) -> Vec<f64> {
        [
            self.result1,
            self.result2,
            self.result3,
            self.result4,
            self.result5,
            self.result6,
            self.result7,
            self.result8,
        ]
        .into_iter()
        .flatten()
        .filter(|r| *r > 0.0)
        .collect()
    }

    /// Matcher view of this row
    pub fn to_external(&self) -> ExternalApplicant {
        ExternalApplicant {
            canonical_id: self.id_application.to_string(),
            rating: self.rating,
            priority: self.priority,
            score_sum: self.sum_mark.unwrap_or_default(),
            exam_scores: self.exam_scores(),
            without_exams: self.without_tests,
            status_code: self.status_id,
        }
    }
}

/// Body of `GET /competition/{id}/applicants`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryResponse {
    pub update_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub applicants: Vec<RegistryApplicant>,
}
