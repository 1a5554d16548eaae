//! Admission channels
//!
//! Every rating list row belongs to exactly one competition type. The
//! names used on the wire match the scraper output and the registry list
//! naming (`Regular`, `BVI`, `TargetQuota`, `DedicatedQuota`, `SpecialQuota`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Admission channel of a single application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Competition {
    /// Open competition ranked by exam scores
    #[default]
    Regular,
    /// Admission without entrance exams, ranked by rating position only
    #[serde(rename = "BVI")]
    Bvi,
    /// Target-training quota
    TargetQuota,
    /// Dedicated quota; one nationwide applicant may hold several local IDs here
    DedicatedQuota,
    /// Special (social) quota
    SpecialQuota,
}

impl Competition {
    /// Scored competition types in the order the matching engine processes them
    pub const SCORED_ORDER: [Competition; 4] = [
        Competition::Regular,
        Competition::SpecialQuota,
        Competition::TargetQuota,
        Competition::DedicatedQuota,
    ];

    /// Wire name of the competition type
    pub fn as_str(&self) -> &'static str {
        match self {
            Competition::Regular => "Regular",
            Competition::Bvi => "BVI",
            Competition::TargetQuota => "TargetQuota",
            Competition::DedicatedQuota => "DedicatedQuota",
            Competition::SpecialQuota => "SpecialQuota",
        }
    }

    /// True for the quota type that may map several internal IDs onto one canonical ID
    pub fn is_many_to_one(&self) -> bool {
        matches!(self, Competition::DedicatedQuota)
    }
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Competition {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Regular" => Ok(Competition::Regular),
            "BVI" => Ok(Competition::Bvi),
            "TargetQuota" => Ok(Competition::TargetQuota),
            "DedicatedQuota" => Ok(Competition::DedicatedQuota),
            "SpecialQuota" => Ok(Competition::SpecialQuota),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown competition type: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for c in [
            Competition::Regular,
            Competition::Bvi,
            Competition::TargetQuota,
            Competition::DedicatedQuota,
            Competition::SpecialQuota,
        ] {
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.as_str()));
            assert_eq!(c.as_str().parse::<Competition>().unwrap(), c);
        }
    }

    #[test]
    fn test_only_dedicated_quota_is_many_to_one() {
        assert!(Competition::DedicatedQuota.is_many_to_one());
        assert!(!Competition::Regular.is_many_to_one());
        assert!(!Competition::SpecialQuota.is_many_to_one());
        assert!(!Competition::TargetQuota.is_many_to_one());
        assert!(!Competition::Bvi.is_many_to_one());
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!("Quota".parse::<Competition>().is_err());
    }
}
