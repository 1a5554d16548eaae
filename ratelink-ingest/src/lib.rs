//! # ratelink ingest library
//!
//! Scraper-side plumbing for the rating pipeline:
//! - `DataReceiver` push interface implemented by every pipeline stage
//! - `BufferedReceiver`, which holds a university's records until their
//!   identifiers are resolved
//! - `ResolverClient`, the batch HTTP client for the resolution service
//! - `HttpPermits` / `SourceHttp`, bounded concurrency for scraper GETs

pub mod buffered;
pub mod client;
pub mod config;
pub mod permits;
pub mod receiver;

pub use buffered::{BufferedReceiver, FinalizeSummary};
pub use client::ResolverClient;
pub use config::{IngestConfig, PermitSettings, ResolverClientSettings};
pub use permits::{HttpPermit, HttpPermits, PermitError, SourceHttp, SourceHttpError};
pub use receiver::DataReceiver;
