//! Per-content engagement counters
//!
//! Counters for one item live in a hash `content:stats:<type>:<id>` whose
//! fields are ASCII decimals, so increments go straight to `hincr_by`. Each
//! content type also keeps an index hash `content:index:<type>` listing the
//! ids that have counters; the ranking scan walks that index.

use crate::error::{CacheError, Result};
use crate::keys::{content_index_key, content_stats_key};
use crate::ranking;
use crate::store::KvStore;
use crate::types::CacheValue;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Layout version written into every counter hash
pub const STATS_SCHEMA_VERSION: u32 = 1;

const UPDATED_AT_FIELD: &str = "updated_at";
const SCHEMA_VERSION_FIELD: &str = "schema_version";

/// One engagement counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatField {
    Views,
    Likes,
    Comments,
    Shares,
    Favorites,
}

impl StatField {
    pub const ALL: [StatField; 5] = [
        StatField::Views,
        StatField::Likes,
        StatField::Comments,
        StatField::Shares,
        StatField::Favorites,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatField::Views => "views",
            StatField::Likes => "likes",
            StatField::Comments => "comments",
            StatField::Shares => "shares",
            StatField::Favorites => "favorites",
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatField {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        StatField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CacheError::InvalidArgument(format!("unknown stat field: {}", s)))
    }
}

/// Full set of counter values, as imported from the system of record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub favorites: i64,
}

impl StatsSnapshot {
    pub fn get(&self, field: StatField) -> i64 {
        match field {
            StatField::Views => self.views,
            StatField::Likes => self.likes,
            StatField::Comments => self.comments,
            StatField::Shares => self.shares,
            StatField::Favorites => self.favorites,
        }
    }

    fn set(&mut self, field: StatField, value: i64) {
        match field {
            StatField::Views => self.views = value,
            StatField::Likes => self.likes = value,
            StatField::Comments => self.comments = value,
            StatField::Shares => self.shares = value,
            StatField::Favorites => self.favorites = value,
        }
    }
}

/// Counters for one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub content_id: String,
    pub content_type: String,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub favorites: i64,
    pub updated_at: DateTime<Utc>,
}

impl ContentStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            views: self.views,
            likes: self.likes,
            comments: self.comments,
            shares: self.shares,
            favorites: self.favorites,
        }
    }

    fn from_hash(
        content_id: &str,
        content_type: &str,
        fields: &HashMap<String, CacheValue>,
    ) -> Result<Self> {
        if let Some(version) = fields.get(SCHEMA_VERSION_FIELD) {
            let version = parse_field::<u32>(content_id, SCHEMA_VERSION_FIELD, version)?;
            if version != STATS_SCHEMA_VERSION {
                return Err(CacheError::SerializationError(format!(
                    "unsupported stats version {} for {}",
                    version, content_id
                )));
            }
        }

        let mut snapshot = StatsSnapshot::default();
        for field in StatField::ALL {
            if let Some(raw) = fields.get(field.as_str()) {
                snapshot.set(field, parse_field::<i64>(content_id, field.as_str(), raw)?);
            }
        }

        let updated_at = match fields.get(UPDATED_AT_FIELD) {
            Some(raw) => {
                let millis = parse_field::<i64>(content_id, UPDATED_AT_FIELD, raw)?;
                Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                    CacheError::SerializationError(format!(
                        "updated_at out of range for {}",
                        content_id
                    ))
                })?
            }
            None => DateTime::<Utc>::default(),
        };

        Ok(Self {
            content_id: content_id.to_string(),
            content_type: content_type.to_string(),
            views: snapshot.views,
            likes: snapshot.likes,
            comments: snapshot.comments,
            shares: snapshot.shares,
            favorites: snapshot.favorites,
            updated_at,
        })
    }
}

fn parse_field<T: FromStr>(content_id: &str, field: &str, raw: &[u8]) -> Result<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .ok_or_else(|| {
            CacheError::SerializationError(format!(
                "field '{}' of {} is not a number",
                field, content_id
            ))
        })
}

fn ascii(n: impl ToString) -> CacheValue {
    n.to_string().into_bytes()
}

/// Engagement counters over a shared store
#[derive(Clone)]
pub struct EngagementCounters {
    store: Arc<dyn KvStore>,
}

impl EngagementCounters {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Overwrite all five counters with a snapshot
    pub async fn update_content_stats(
        &self,
        content_id: &str,
        content_type: &str,
        stats: StatsSnapshot,
    ) -> Result<()> {
        let key = content_stats_key(content_type, content_id)?;

        let mut fields: Vec<(String, CacheValue)> = StatField::ALL
            .iter()
            .map(|field| (field.as_str().to_string(), ascii(stats.get(*field))))
            .collect();
        fields.push((UPDATED_AT_FIELD.to_string(), ascii(Utc::now().timestamp_millis())));
        fields.push((SCHEMA_VERSION_FIELD.to_string(), ascii(STATS_SCHEMA_VERSION)));

        self.store.hset_multiple(&key, &fields).await?;
        self.index(content_id, content_type).await?;

        info!("Updated stats for {} {}", content_type, content_id);
        Ok(())
    }

    /// Atomically add `amount` to one counter; returns the new value
    pub async fn increment(
        &self,
        content_id: &str,
        content_type: &str,
        field: StatField,
        amount: i64,
    ) -> Result<i64> {
        let key = content_stats_key(content_type, content_id)?;

        // Stamp before counting: a clear landing in between leaves a hash
        // holding only this delta, never a hash without counters.
        self.store
            .hset_multiple(
                &key,
                &[
                    (UPDATED_AT_FIELD.to_string(), ascii(Utc::now().timestamp_millis())),
                    (SCHEMA_VERSION_FIELD.to_string(), ascii(STATS_SCHEMA_VERSION)),
                ],
            )
            .await?;
        let value = self.store.hincr_by(&key, field.as_str(), amount).await?;
        self.index(content_id, content_type).await?;

        debug!("{} {} {} -> {}", content_type, content_id, field, value);
        Ok(value)
    }

    pub async fn increment_views(&self, content_id: &str, content_type: &str) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Views, 1).await
    }

    pub async fn increment_views_by(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Views, amount).await
    }

    pub async fn increment_likes(&self, content_id: &str, content_type: &str) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Likes, 1).await
    }

    pub async fn increment_likes_by(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Likes, amount).await
    }

    pub async fn increment_comments(&self, content_id: &str, content_type: &str) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Comments, 1).await
    }

    pub async fn increment_comments_by(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Comments, amount).await
    }

    pub async fn increment_shares(&self, content_id: &str, content_type: &str) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Shares, 1).await
    }

    pub async fn increment_favorites(&self, content_id: &str, content_type: &str) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Favorites, 1).await
    }

    /// Counters for one item, or `None` when none are cached
    pub async fn get_content_stats(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<Option<ContentStats>> {
        let key = content_stats_key(content_type, content_id)?;
        let fields = self.store.hgetall(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        ContentStats::from_hash(content_id, content_type, &fields).map(Some)
    }

    /// Counters for several items; ids without counters are left out
    pub async fn get_batch_content_stats<S: AsRef<str>>(
        &self,
        content_ids: &[S],
        content_type: &str,
    ) -> Result<HashMap<String, ContentStats>> {
        let lookups = content_ids
            .iter()
            .map(|id| self.get_content_stats(id.as_ref(), content_type));
        let found = try_join_all(lookups).await?;

        Ok(found
            .into_iter()
            .flatten()
            .map(|stats| (stats.content_id.clone(), stats))
            .collect())
    }

    /// Counters for the indexed ids of a ranking scan.
    ///
    /// Ids whose counters are gone come back as `None`. Unreadable hashes are
    /// logged and left out so one bad item cannot stall the whole type.
    pub(crate) async fn scan_indexed(
        &self,
        content_ids: &[String],
        content_type: &str,
    ) -> Result<Vec<(String, Option<ContentStats>)>> {
        let lookups = content_ids
            .iter()
            .map(|id| self.get_content_stats(id, content_type));
        let found = join_all(lookups).await;

        let mut scanned = Vec::with_capacity(content_ids.len());
        for (id, result) in content_ids.iter().zip(found) {
            match result {
                Ok(stats) => scanned.push((id.clone(), stats)),
                Err(CacheError::SerializationError(e)) => {
                    warn!("Skipping unreadable stats for {} {}: {}", content_type, id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scanned)
    }

    /// Drop the counters for one item and remove it from the cached ranking.
    ///
    /// Returns whether counters existed.
    pub async fn clear_content_cache(&self, content_id: &str, content_type: &str) -> Result<bool> {
        let key = content_stats_key(content_type, content_id)?;

        let removed = self.store.delete(&key).await?;
        self.forget(content_id, content_type).await?;
        ranking::strip_from_ranking(self.store.as_ref(), content_type, content_id).await?;

        info!("Cleared cached stats for {} {}", content_type, content_id);
        Ok(removed)
    }

    /// Ids with counters for `content_type`, sorted
    pub async fn content_ids(&self, content_type: &str) -> Result<Vec<String>> {
        let index = self.store.hgetall(&content_index_key(content_type)?).await?;
        let mut ids: Vec<String> = index.into_keys().collect();
        ids.sort();
        Ok(ids)
    }

    async fn index(&self, content_id: &str, content_type: &str) -> Result<()> {
        self.store
            .hset(&content_index_key(content_type)?, content_id, b"1".to_vec())
            .await?;
        Ok(())
    }

    /// Remove an id from the per-type index
    pub(crate) async fn forget(&self, content_id: &str, content_type: &str) -> Result<()> {
        self.store
            .hdel(&content_index_key(content_type)?, content_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::hooked::{HookOp, HookedStore};
    use futures::FutureExt;

    fn counters() -> (Arc<MemoryStore>, EngagementCounters) {
        let store = MemoryStore::open();
        (store.clone(), EngagementCounters::new(store))
    }

    #[test]
    fn test_stat_field_parse() {
        assert_eq!("likes".parse::<StatField>().unwrap(), StatField::Likes);
        assert!("stars".parse::<StatField>().is_err());
    }

    #[tokio::test]
    async fn test_increment_creates_counters() {
        let (_, counters) = counters();

        assert_eq!(counters.increment_likes("p1", "post").await.unwrap(), 1);
        assert_eq!(counters.increment_likes_by("p1", "post", 4).await.unwrap(), 5);

        let stats = counters.get_content_stats("p1", "post").await.unwrap().unwrap();
        assert_eq!(stats.likes, 5);
        assert_eq!(stats.views, 0);
        assert_eq!(counters.content_ids("post").await.unwrap(), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_hash_layout() {
        let (store, counters) = counters();
        counters
            .update_content_stats(
                "w1",
                "work",
                StatsSnapshot {
                    views: 7,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fields = store.hgetall("content:stats:work:w1").await.unwrap();
        assert_eq!(fields.get("views"), Some(&b"7".to_vec()));
        assert_eq!(fields.get("schema_version"), Some(&b"1".to_vec()));
        assert!(fields.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn test_corrupt_counter_is_serialization_error() {
        let (store, counters) = counters();
        store
            .hset("content:stats:work:w1", "views", b"lots".to_vec())
            .await
            .unwrap();

        let result = counters.get_content_stats("w1", "work").await;
        assert!(matches!(result, Err(CacheError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_missing_stats_absent() {
        let (_, counters) = counters();
        assert!(counters.get_content_stats("nope", "work").await.unwrap().is_none());
        assert!(!counters.clear_content_cache("nope", "work").await.unwrap());
    }

    /// Stats store whose `w1` counters are cleared once, right after the
    /// given write, the way a concurrent `clear_content_cache` would
    fn clear_after(op: HookOp) -> Arc<HookedStore> {
        HookedStore::new(op, "content:stats:work:w1", |inner| {
            async move {
                inner.delete("content:stats:work:w1").await.unwrap();
                inner.hdel("content:index:work", "w1").await.unwrap();
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_clear_between_stamp_and_count_keeps_delta() {
        let store = clear_after(HookOp::HSetMultiple);
        let counters = EngagementCounters::new(store.clone());

        assert_eq!(counters.increment_likes_by("w1", "work", 7).await.unwrap(), 7);

        let stats = counters.get_content_stats("w1", "work").await.unwrap().unwrap();
        assert_eq!(stats.likes, 7);
        assert_eq!(stats.views, 0);
        assert_eq!(counters.content_ids("work").await.unwrap(), vec!["w1"]);
    }

    #[tokio::test]
    async fn test_clear_after_count_leaves_no_empty_counters() {
        let store = clear_after(HookOp::HIncrBy);
        let counters = EngagementCounters::new(store.clone());

        counters.increment_likes_by("w1", "work", 7).await.unwrap();

        // The cleared item has no counters, so the scan reports it gone
        assert!(counters.get_content_stats("w1", "work").await.unwrap().is_none());
        let ids = counters.content_ids("work").await.unwrap();
        let scanned = counters.scan_indexed(&ids, "work").await.unwrap();
        assert!(scanned.iter().all(|(_, stats)| stats.is_none()));
    }

    #[tokio::test]
    async fn test_scan_skips_unreadable_stats() {
        let (store, counters) = counters();
        counters.increment_views("good", "work").await.unwrap();
        counters.increment_views("bad", "work").await.unwrap();
        store
            .hset("content:stats:work:bad", "views", b"lots".to_vec())
            .await
            .unwrap();

        let ids = counters.content_ids("work").await.unwrap();
        let scanned = counters.scan_indexed(&ids, "work").await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, "good");
        assert!(scanned[0].1.is_some());
    }
}
