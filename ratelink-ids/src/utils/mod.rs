//! Utility modules for ratelink-ids

pub mod backoff;
pub mod db_retry;

pub use backoff::{retry_with_backoff, RetryExhausted, RetryPolicy, Sleeper, TokioSleeper};
pub use db_retry::retry_on_lock;
