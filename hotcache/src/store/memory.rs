//! In-process store backend with lazy and active TTL eviction

use crate::error::{CacheError, Result};
use crate::store::entry::{parse_integer, Entry, EntryData};
use crate::store::{resolve_range, validate_key, validate_ttl, KvStore, PONG};
use crate::types::{CacheKey, CacheStats, CacheValue, StoreInfo, Ttl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-process keyspace
///
/// This implementation provides:
/// - Thread-safe async access via RwLock; every mutation holds the write lock,
///   so each operation is atomic with respect to the keys it touches
/// - Lazy expiry: an expired entry is invisible to every operation
/// - Active expiry through [`KvStore::purge_expired`]
/// - Activity counters reported by `info`
pub struct MemoryStore {
    /// Internal storage
    keyspace: Arc<RwLock<Keyspace>>,

    /// Set once `close` has run
    closed: AtomicBool,

    opened_at: DateTime<Utc>,
}

/// Internal keyspace storage
#[derive(Default)]
struct Keyspace {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, Entry>,

    /// Activity counters
    stats: CacheStats,
}

impl Keyspace {
    /// Drop `key` if it has expired, then borrow it mutably
    fn live_mut(&mut self, key: &str, now: DateTime<Utc>) -> Option<&mut Entry> {
        self.evict_if_expired(key, now);
        self.entries.get_mut(key)
    }

    /// Drop `key` if it has expired, then borrow it
    fn live(&mut self, key: &str, now: DateTime<Utc>) -> Option<&Entry> {
        self.evict_if_expired(key, now);
        self.entries.get(key)
    }

    fn evict_if_expired(&mut self, key: &str, now: DateTime<Utc>) {
        let expired = self
            .entries
            .get(key)
            .map(|entry| entry.is_expired_at(now))
            .unwrap_or(false);

        if expired {
            debug!("Lazily evicting expired key: {}", key);
            self.entries.remove(key);
            self.stats.evictions_lazy += 1;
        }
    }

    /// Fetch a live entry for mutation, creating it with `init` when absent
    fn entry_or_insert(
        &mut self,
        key: &str,
        now: DateTime<Utc>,
        init: impl FnOnce() -> EntryData,
    ) -> &mut Entry {
        self.evict_if_expired(key, now);
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(init(), None))
    }

    /// Remove `key` when a pop or field delete emptied its aggregate
    fn remove_if_empty(&mut self, key: &str) {
        let empty = self
            .entries
            .get(key)
            .map(|entry| entry.data.is_empty_aggregate())
            .unwrap_or(false);
        if empty {
            self.entries.remove(key);
        }
    }

    fn record_read(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }

    fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Initializing in-process store");

        Self {
            keyspace: Arc::new(RwLock::new(Keyspace::default())),
            closed: AtomicBool::new(false),
            opened_at: Utc::now(),
        }
    }

    /// Create an empty store behind an `Arc`, ready for injection
    pub fn open() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get store statistics
    pub async fn stats(&self) -> CacheStats {
        let keyspace = self.keyspace.read().await;
        let mut stats = keyspace.stats.clone();
        stats.keys = keyspace.live_count(Utc::now());
        stats
    }

    /// Internal: fail once the store has been closed, count the command otherwise
    async fn lock(&self) -> Result<tokio::sync::RwLockWriteGuard<'_, Keyspace>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::BackingStoreUnavailable {
                attempts: 0,
                reason: "store is closed".to_string(),
            });
        }
        let mut keyspace = self.keyspace.write().await;
        keyspace.stats.commands += 1;
        Ok(keyspace)
    }

    /// Internal: shared body of `lpush`/`rpush`
    async fn push(&self, key: &str, value: CacheValue, front: bool) -> Result<usize> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;
        let entry = keyspace.entry_or_insert(key, Utc::now(), || EntryData::List(VecDeque::new()));
        let items = entry.as_list_mut(key)?;

        if front {
            items.push_front(value);
        } else {
            items.push_back(value);
        }
        Ok(items.len())
    }

    /// Internal: shared body of `lpop`/`rpop`
    async fn pop(&self, key: &str, front: bool) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let popped = match keyspace.live_mut(key, Utc::now()) {
            Some(entry) => {
                let items = entry.as_list_mut(key)?;
                if front {
                    items.pop_front()
                } else {
                    items.pop_back()
                }
            }
            None => None,
        };

        keyspace.remove_if_empty(key);
        keyspace.record_read(popped.is_some());
        Ok(popped)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let value = match keyspace.live(key, Utc::now()) {
            Some(entry) => Some(entry.as_string(key)?.clone()),
            None => None,
        };

        keyspace.record_read(value.is_some());
        Ok(value)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        validate_ttl(ttl)?;
        let mut keyspace = self.lock().await?;

        debug!("Setting key: {} (ttl: {:?})", key, ttl);
        keyspace
            .entries
            .insert(key.to_string(), Entry::new(EntryData::String(value), ttl));
        Ok(())
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        validate_key(key)?;
        validate_ttl(ttl)?;
        let mut keyspace = self.lock().await?;

        if keyspace.live(key, Utc::now()).is_none() {
            return Ok(false);
        }

        keyspace
            .entries
            .insert(key.to_string(), Entry::new(EntryData::String(value), ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let now = Utc::now();
        let removed = keyspace
            .entries
            .remove(key)
            .map(|entry| !entry.is_expired_at(now))
            .unwrap_or(false);

        debug!("Deleted key: {} (live: {})", key, removed);
        Ok(removed)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        for key in keys {
            validate_key(key)?;
        }
        let mut keyspace = self.lock().await?;

        let now = Utc::now();
        let removed = keys
            .iter()
            .filter_map(|key| keyspace.entries.remove(key))
            .filter(|entry| !entry.is_expired_at(now))
            .count();

        debug!("Deleted {} of {} keys", removed, keys.len());
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;
        Ok(keyspace.live(key, Utc::now()).is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| {
            CacheError::InvalidArgument(format!("invalid key pattern '{}': {}", pattern, e))
        })?;
        let keyspace = self.lock().await?;

        let now = Utc::now();
        let mut keys: Vec<String> = keyspace
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && matcher.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let entry = keyspace.entry_or_insert(key, Utc::now(), || {
            EntryData::String(b"0".to_vec())
        });
        let value = entry.as_string_mut(key)?;
        let current = parse_integer(key, value)?;
        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::InvalidArgument(format!("increment of '{}' by {} overflows", key, delta))
        })?;

        *value = next.to_string().into_bytes();
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        Ok(keyspace.live(key, Utc::now()).map(|entry| match entry.expires_at {
            None => Ttl::Persistent,
            Some(_) => Ttl::Remaining(entry.time_until_expiration().unwrap_or_default()),
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        validate_key(key)?;
        validate_ttl(Some(ttl))?;
        let mut keyspace = self.lock().await?;

        match keyspace.live_mut(key, Utc::now()) {
            Some(entry) => {
                entry.set_ttl(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: CacheValue) -> Result<bool> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let entry = keyspace.entry_or_insert(key, Utc::now(), || EntryData::Hash(HashMap::new()));
        let fields = entry.as_hash_mut(key)?;
        Ok(fields.insert(field.to_string(), value).is_none())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, CacheValue)]) -> Result<()> {
        validate_key(key)?;
        if fields.is_empty() {
            return Err(CacheError::InvalidArgument(
                "hset_multiple requires at least one field".to_string(),
            ));
        }
        let mut keyspace = self.lock().await?;

        let entry = keyspace.entry_or_insert(key, Utc::now(), || EntryData::Hash(HashMap::new()));
        let hash = entry.as_hash_mut(key)?;
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let value = match keyspace.live(key, Utc::now()) {
            Some(entry) => entry.as_hash(key)?.get(field).cloned(),
            None => None,
        };

        keyspace.record_read(value.is_some());
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let fields = match keyspace.live(key, Utc::now()) {
            Some(entry) => entry.as_hash(key)?.clone(),
            None => HashMap::new(),
        };

        keyspace.record_read(!fields.is_empty());
        Ok(fields)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let removed = match keyspace.live_mut(key, Utc::now()) {
            Some(entry) => entry.as_hash_mut(key)?.remove(field).is_some(),
            None => false,
        };

        keyspace.remove_if_empty(key);
        Ok(removed)
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let entry = keyspace.entry_or_insert(key, Utc::now(), || EntryData::Hash(HashMap::new()));
        let fields = entry.as_hash_mut(key)?;
        let current = match fields.get(field) {
            Some(value) => parse_integer(key, value)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::InvalidArgument(format!(
                "increment of '{}'.'{}' by {} overflows",
                key, field, delta
            ))
        })?;

        fields.insert(field.to_string(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn lpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        self.push(key, value, true).await
    }

    async fn rpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        self.push(key, value, false).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.pop(key, true).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.pop(key, false).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        let items = match keyspace.live(key, Utc::now()) {
            Some(entry) => {
                let list = entry.as_list(key)?;
                match resolve_range(list.len(), start, stop) {
                    Some((from, to)) => list.range(from..=to).cloned().collect(),
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        Ok(items)
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        let mut keyspace = self.lock().await?;

        match keyspace.live(key, Utc::now()) {
            Some(entry) => Ok(entry.as_list(key)?.len()),
            None => Ok(0),
        }
    }

    async fn dbsize(&self) -> Result<usize> {
        let keyspace = self.lock().await?;
        Ok(keyspace.live_count(Utc::now()))
    }

    async fn ping(&self) -> Result<String> {
        self.lock().await?;
        Ok(PONG.to_string())
    }

    async fn info(&self) -> Result<StoreInfo> {
        let keyspace = self.lock().await?;
        let now = Utc::now();

        let mut stats = keyspace.stats.clone();
        stats.keys = keyspace.live_count(now);

        let mut details = BTreeMap::new();
        details.insert("entries_allocated".to_string(), keyspace.entries.len().to_string());
        details.insert("opened_at".to_string(), self.opened_at.to_rfc3339());

        Ok(StoreInfo {
            backend: "memory".to_string(),
            keys: stats.keys,
            uptime_secs: (now - self.opened_at).num_seconds().max(0) as u64,
            stats: Some(stats),
            details,
        })
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut keyspace = self.lock().await?;
        let now = Utc::now();

        let before = keyspace.entries.len();
        keyspace.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - keyspace.entries.len();

        if removed > 0 {
            keyspace.stats.evictions_sweep += removed as u64;
            debug!("Purged {} expired entries", removed);
        }
        Ok(removed)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut keyspace = self.keyspace.write().await;
        let count = keyspace.entries.len();
        keyspace.entries.clear();

        info!("Closed in-process store ({} entries dropped)", count);
        Ok(())
    }
}
