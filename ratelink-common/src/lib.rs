//! # ratelink common library
//!
//! Shared code for the ratelink crates:
//! - Competition types and scraper record types
//! - Resolve request/response wire types and the `IdResolver` seam
//! - Internal ID extraction and fallback identities
//! - Configuration file loading
//! - Common error type

pub mod competition;
pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod resolve;

pub use competition::Competition;
pub use error::{Error, Result};
pub use identity::{extract_internal_id, fallback_id, is_fallback_id, FALLBACK_PREFIX};
pub use resolve::{AppDetails, IdResolver, ResolveRequestItem, ResolveResponseItem};
