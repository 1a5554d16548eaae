//! Two-level cache: in-process memory with TTL over a durable store

pub mod layered;
pub mod memory;

pub use layered::LayeredCache;
pub use memory::MemoryCache;

use async_trait::async_trait;

/// Durable cache layer
///
/// Implementations swallow their own failures (logging them): a failed
/// read is a miss and a failed write leaves the memory layer authoritative.
#[async_trait]
pub trait PersistentStore<V>: Send + Sync {
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: &V);
    async fn clear(&self);
}
