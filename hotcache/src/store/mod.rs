//! # Store
//!
//! The primitive key/value engine: strings, hashes and lists, each with an
//! optional per-key TTL. The store knows nothing about sessions or content.
//!
//! Two interchangeable backends implement [`KvStore`]:
//!
//! - [`MemoryStore`]: an in-process keyspace for tests and single-instance
//!   deployments. Expired entries are invisible immediately (lazy check on
//!   every access) and physically removed by [`KvStore::purge_expired`].
//! - [`RedisStore`]: a networked Redis server. Every call carries a timeout
//!   and a bounded retry budget, after which it fails with
//!   [`CacheError::BackingStoreUnavailable`](crate::CacheError).
//!
//! Every operation is atomic at the granularity of the key it touches.

pub mod entry;
#[cfg(test)]
pub(crate) mod hooked;
pub mod memory;
pub mod remote;
pub mod retry;

pub use entry::{Entry, EntryData, EntryKind};
pub use memory::MemoryStore;
pub use remote::RedisStore;
pub use retry::RetryPolicy;

use crate::error::{CacheError, Result};
use crate::types::{CacheValue, StoreInfo, Ttl};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Token returned by a healthy store's `ping`
pub const PONG: &str = "PONG";

/// Primitive key/value operations shared by every backend
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a string value; absent when the key is missing or expired
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store a string value, replacing any existing entry of any shape
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()>;

    /// Store a string value only if a live entry already exists
    async fn set_if_exists(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Delete a key; returns whether a live entry was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete several keys in one atomic step; returns the number removed
    async fn delete_many(&self, keys: &[String]) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Live keys matching a glob-style pattern, sorted
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically add `delta` to an integer string, creating it at `delta`
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomically subtract `delta` from an integer string
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta
            .checked_neg()
            .ok_or_else(|| CacheError::InvalidArgument(format!("decrement {} overflows", delta)))?;
        self.incr_by(key, negated).await
    }

    /// Remaining lifetime; absent when the key is missing
    async fn ttl(&self, key: &str) -> Result<Option<Ttl>>;

    /// Set a new TTL on an existing key; false when the key is missing
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Set one hash field; returns true when the field is new
    async fn hset(&self, key: &str, field: &str, value: CacheValue) -> Result<bool>;

    /// Set several hash fields in one atomic step
    async fn hset_multiple(&self, key: &str, fields: &[(String, CacheValue)]) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>>;

    /// All fields of a hash; empty when the key is missing
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>>;

    /// Remove one hash field; returns whether it existed
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    /// Atomically add `delta` to an integer hash field
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Push to the head of a list; returns the new length
    async fn lpush(&self, key: &str, value: CacheValue) -> Result<usize>;

    /// Push to the tail of a list; returns the new length
    async fn rpush(&self, key: &str, value: CacheValue) -> Result<usize>;

    async fn lpop(&self, key: &str) -> Result<Option<CacheValue>>;

    async fn rpop(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Inclusive range; negative indices count from the end
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>>;

    async fn llen(&self, key: &str) -> Result<usize>;

    /// Count of live keys
    async fn dbsize(&self) -> Result<usize>;

    /// Liveness check
    async fn ping(&self) -> Result<String>;

    /// Diagnostic summary
    async fn info(&self) -> Result<StoreInfo>;

    /// One active-eviction pass; returns the number of entries removed
    async fn purge_expired(&self) -> Result<usize>;

    /// Release the backing resource
    async fn close(&self) -> Result<()>;
}

/// Reject empty keys before they reach a backend
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}

/// Reject zero TTLs; a TTL must be positive when supplied
pub(crate) fn validate_ttl(ttl: Option<Duration>) -> Result<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(CacheError::InvalidArgument(
            "ttl must be greater than zero".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Resolve an inclusive, possibly negative index range against a length.
///
/// Returns `None` when the range selects nothing.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}
