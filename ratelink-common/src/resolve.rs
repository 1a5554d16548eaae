//! Resolve request/response wire types and the resolver seam
//!
//! JSON field names follow the resolution service's public contract
//! (`internalID`, `canonicalID`, `prettyName`, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Competition, Result};

/// Details of one application needed for identifier resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppDetails {
    /// Program name
    #[serde(rename = "prettyName")]
    pub pretty_name: String,
    #[serde(rename = "scoreSum", default)]
    pub score_sum: i32,
    #[serde(rename = "ratingPlace", default)]
    pub rating_place: i32,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "dviScore", default)]
    pub dvi_score: i32,
    #[serde(rename = "egeScores", default)]
    pub ege_scores: Vec<i32>,
    #[serde(rename = "achievementsScore", default)]
    pub achievements_score: i32,
    /// Admission channel; older callers omit it and are treated as Regular
    #[serde(
        rename = "competitionType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub competition_type: Option<Competition>,
}

impl AppDetails {
    /// Competition type, defaulting to Regular when the caller did not send one
    pub fn competition(&self) -> Competition {
        self.competition_type.unwrap_or_default()
    }
}

/// One internal ID with all of its applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequestItem {
    #[serde(rename = "internalID")]
    pub internal_id: String,
    #[serde(default)]
    pub apps: Vec<AppDetails>,
}

/// Resolution outcome for one internal ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponseItem {
    #[serde(rename = "internalID")]
    pub internal_id: String,
    #[serde(rename = "canonicalID")]
    pub canonical_id: String,
    /// 0.0..=1.0; 0.0 means a fallback identity
    pub confidence: f64,
}

impl ResolveResponseItem {
    /// Fallback response for an internal ID
    pub fn fallback(internal_id: &str) -> Self {
        Self {
            internal_id: internal_id.to_string(),
            canonical_id: crate::fallback_id(internal_id),
            confidence: 0.0,
        }
    }
}

/// Anything that can turn internal IDs into canonical IDs
///
/// Implemented by the HTTP client used by the scraper pipeline and by the
/// resolution service itself, so the buffered receiver can be wired to
/// either.
#[async_trait]
pub trait IdResolver: Send + Sync {
    /// Resolve a batch; implementations return one item per request item
    async fn resolve_batch(&self, items: Vec<ResolveRequestItem>) -> Result<Vec<ResolveResponseItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_contract_field_names() {
        let json = r#"{"internalID":"028478","apps":[{"prettyName":"Астрономия","scoreSum":280,"ratingPlace":5,"priority":1,"dviScore":90,"egeScores":[95,95],"achievementsScore":0}]}"#;
        let item: ResolveRequestItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.internal_id, "028478");
        assert_eq!(item.apps[0].rating_place, 5);
        assert_eq!(item.apps[0].competition(), Competition::Regular);
    }

    #[test]
    fn test_competition_type_is_optional_on_the_wire() {
        let app = AppDetails {
            pretty_name: "Физика".to_string(),
            competition_type: Some(Competition::Bvi),
            ..Default::default()
        };
        let value = serde_json::to_value(&app).unwrap();
        assert_eq!(value["competitionType"], "BVI");

        let plain = AppDetails::default();
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("competitionType").is_none());
    }

    #[test]
    fn test_response_fallback() {
        let item = ResolveResponseItem::fallback("000042");
        assert_eq!(item.canonical_id, "MSU-000042");
        assert_eq!(item.confidence, 0.0);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["canonicalID"], "MSU-000042");
    }
}
