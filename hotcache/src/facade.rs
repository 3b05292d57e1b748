//! The cache facade
//!
//! [`HotCache`] is the one object callers hold. It owns the store connection,
//! the session registry, the engagement counters, the ranking engine and the
//! background scheduler, and exposes them as a single API.

use crate::codec::{decode_record, encode_record, Record, TypedValue, ValueKind};
use crate::config::{Backend, CacheConfig};
use crate::engagement::{ContentStats, EngagementCounters, StatField, StatsSnapshot};
use crate::error::Result;
use crate::ranking::{RankedItem, RankingEngine, RankingList};
use crate::scheduler::Scheduler;
use crate::session::{DeviceInfo, Session, SessionRegistry};
use crate::store::{KvStore, MemoryStore, RedisStore};
use crate::types::{CacheValue, StoreInfo, Ttl};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared cache, session registry and ranking engine
pub struct HotCache {
    config: CacheConfig,
    store: Arc<dyn KvStore>,
    sessions: SessionRegistry,
    counters: EngagementCounters,
    ranking: Arc<RankingEngine>,
    scheduler: Scheduler,
}

impl HotCache {
    /// Open the backend named by `config` and wire up the services
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn KvStore> = match config.backend {
            Backend::Memory => MemoryStore::open(),
            Backend::Redis => RedisStore::open(&config.remote).await?,
        };

        Self::with_store(store, config)
    }

    /// Wire the services around an already-open store
    pub fn with_store(store: Arc<dyn KvStore>, config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let sessions = SessionRegistry::new(store.clone(), config.session_ttl);
        let counters = EngagementCounters::new(store.clone());
        let ranking = RankingEngine::new(
            store.clone(),
            counters.clone(),
            config.ranking_weights,
            config.ranking_capacity,
        )
        .with_content_types(config.ranked_content_types.iter().cloned());

        info!("Opened hot cache ({:?} backend)", config.backend);

        Ok(Self {
            config,
            store,
            sessions,
            counters,
            ranking: Arc::new(ranking),
            scheduler: Scheduler::new(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn counters(&self) -> &EngagementCounters {
        &self.counters
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    /// Start the TTL sweep and, when configured, the ranking refresh loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_background(&self) -> Result<()> {
        if self.config.enable_auto_sweep {
            let store = self.store.clone();
            self.scheduler
                .spawn_periodic("ttl-sweep", self.config.sweep_interval, move || {
                    let store = store.clone();
                    async move {
                        let purged = store.purge_expired().await?;
                        if purged > 0 {
                            debug!("TTL sweep purged {} key(s)", purged);
                        }
                        Ok(())
                    }
                })?;
        }

        match self.config.ranking_refresh_interval {
            Some(interval) if !self.config.ranked_content_types.is_empty() => {
                let ranking = self.ranking.clone();
                self.scheduler
                    .spawn_periodic("ranking-refresh", interval, move || {
                        let ranking = ranking.clone();
                        async move { ranking.refresh_all().await.map(|_| ()) }
                    })?;
            }
            Some(_) => warn!("Ranking refresh interval set but no content types configured"),
            None => {}
        }

        Ok(())
    }

    /// Number of running background loops
    pub fn background_tasks(&self) -> usize {
        self.scheduler.task_count()
    }

    /// Stop background loops, then release the store
    pub async fn close(&self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.store.close().await?;
        info!("Closed hot cache");
        Ok(())
    }

    // Store primitives

    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.store.get(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store.set(key, value.into(), ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        self.store.delete_many(keys).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.store.exists(key).await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.store.keys(pattern).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.store.incr_by(key, delta).await
    }

    pub async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.store.decr_by(key, delta).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        self.store.ttl(key).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.store.expire(key, ttl).await
    }

    pub async fn hset(&self, key: &str, field: &str, value: impl Into<CacheValue>) -> Result<bool> {
        self.store.hset(key, field, value.into()).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>> {
        self.store.hget(key, field).await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>> {
        self.store.hgetall(key).await
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.store.hdel(key, field).await
    }

    pub async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.store.hincr_by(key, field, delta).await
    }

    pub async fn lpush(&self, key: &str, value: impl Into<CacheValue>) -> Result<usize> {
        self.store.lpush(key, value.into()).await
    }

    pub async fn rpush(&self, key: &str, value: impl Into<CacheValue>) -> Result<usize> {
        self.store.rpush(key, value.into()).await
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.store.lpop(key).await
    }

    pub async fn rpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.store.rpop(key).await
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>> {
        self.store.lrange(key, start, stop).await
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        self.store.llen(key).await
    }

    pub async fn dbsize(&self) -> Result<usize> {
        self.store.dbsize().await
    }

    pub async fn ping(&self) -> Result<String> {
        self.store.ping().await
    }

    pub async fn info(&self) -> Result<StoreInfo> {
        self.store.info().await
    }

    // Typed values

    /// Store a scalar in its tagged byte form
    pub async fn set_typed(
        &self,
        key: &str,
        value: &TypedValue,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store.set(key, value.encode()?, ttl).await
    }

    /// Read a scalar back as `kind`
    pub async fn get_typed(&self, key: &str, kind: ValueKind) -> Result<Option<TypedValue>> {
        match self.store.get(key).await? {
            Some(bytes) => TypedValue::decode(kind, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Store a structured record inside its versioned envelope
    pub async fn set_record<T: Record>(
        &self,
        key: &str,
        record: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store.set(key, encode_record(record)?, ttl).await
    }

    pub async fn get_record<T: Record>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Return the cached value for `key`, computing and caching it on a miss.
    ///
    /// When the store is unreachable the computed value is returned without
    /// being cached, so callers keep working off the system of record.
    pub async fn cache_aside<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>>,
    {
        match self.store.get(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if e.is_unavailable() => {
                warn!("Cache unavailable for {}, computing directly: {}", key, e);
                return compute().await;
            }
            Err(e) => return Err(e),
        }

        let value = compute().await?;
        match self.store.set(key, value.clone(), ttl).await {
            Ok(()) => {}
            Err(e) if e.is_unavailable() => {
                warn!("Could not cache {}: {}", key, e);
            }
            Err(e) => return Err(e),
        }
        Ok(value)
    }

    // Sessions

    pub async fn create_session(&self, user_id: &str, device: DeviceInfo) -> Result<Session> {
        self.sessions.create_session(user_id, device).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.sessions.get_session(session_id).await
    }

    pub async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.sessions.get_user_sessions(user_id).await
    }

    pub async fn is_user_online(&self, user_id: &str) -> Result<bool> {
        self.sessions.is_user_online(user_id).await
    }

    pub async fn count_user_sessions(&self, user_id: &str) -> Result<usize> {
        self.sessions.count_user_sessions(user_id).await
    }

    pub async fn update_session_activity(&self, session_id: &str) -> Result<Option<Session>> {
        self.sessions.update_session_activity(session_id).await
    }

    pub async fn destroy_session(&self, session_id: &str) -> Result<bool> {
        self.sessions.destroy_session(session_id).await
    }

    pub async fn destroy_user_sessions(&self, user_id: &str) -> Result<usize> {
        self.sessions.destroy_user_sessions(user_id).await
    }

    // Engagement

    pub async fn update_content_stats(
        &self,
        content_id: &str,
        content_type: &str,
        stats: StatsSnapshot,
    ) -> Result<()> {
        self.counters
            .update_content_stats(content_id, content_type, stats)
            .await
    }

    pub async fn increment(
        &self,
        content_id: &str,
        content_type: &str,
        field: StatField,
        amount: i64,
    ) -> Result<i64> {
        self.counters
            .increment(content_id, content_type, field, amount)
            .await
    }

    pub async fn increment_views(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Views, amount).await
    }

    pub async fn increment_likes(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Likes, amount).await
    }

    pub async fn increment_comments(
        &self,
        content_id: &str,
        content_type: &str,
        amount: i64,
    ) -> Result<i64> {
        self.increment(content_id, content_type, StatField::Comments, amount).await
    }

    pub async fn get_content_stats(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<Option<ContentStats>> {
        self.counters.get_content_stats(content_id, content_type).await
    }

    pub async fn get_batch_content_stats<S: AsRef<str>>(
        &self,
        content_ids: &[S],
        content_type: &str,
    ) -> Result<HashMap<String, ContentStats>> {
        self.counters
            .get_batch_content_stats(content_ids, content_type)
            .await
    }

    pub async fn clear_content_cache(&self, content_id: &str, content_type: &str) -> Result<bool> {
        self.counters.clear_content_cache(content_id, content_type).await
    }

    // Ranking

    pub async fn refresh_hot_ranking(&self, content_type: &str) -> Result<RankingList> {
        self.ranking.refresh_hot_ranking(content_type).await
    }

    pub async fn get_hot_content(
        &self,
        content_type: &str,
        count: usize,
    ) -> Result<Vec<RankedItem>> {
        self.ranking.get_hot_content(content_type, count).await
    }

    pub async fn get_ranking(&self, content_type: &str) -> Result<Option<RankingList>> {
        self.ranking.get_ranking(content_type).await
    }

    pub async fn refresh_all(&self) -> Result<usize> {
        self.ranking.refresh_all().await
    }
}
