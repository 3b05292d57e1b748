//! A test store that runs a one-shot hook between two steps of a caller,
//! used to reproduce races deterministically.

use super::{KvStore, MemoryStore};
use crate::error::Result;
use crate::types::{CacheValue, StoreInfo, Ttl};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Operation after which the hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOp {
    HGetAll,
    HSetMultiple,
    HIncrBy,
}

type Hook = Box<dyn FnOnce(Arc<MemoryStore>) -> BoxFuture<'static, ()> + Send>;

pub struct HookedStore {
    inner: Arc<MemoryStore>,
    op: HookOp,
    key: String,
    hook: Mutex<Option<Hook>>,
}

impl HookedStore {
    pub fn new<F>(op: HookOp, key: &str, hook: F) -> Arc<Self>
    where
        F: FnOnce(Arc<MemoryStore>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        Arc::new(Self {
            inner: MemoryStore::open(),
            op,
            key: key.to_string(),
            hook: Mutex::new(Some(Box::new(hook))),
        })
    }

    async fn after(&self, op: HookOp, key: &str) {
        if op != self.op || key != self.key {
            return;
        }
        let hook = self.hook.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook(self.inner.clone()).await;
        }
    }
}

#[async_trait]
impl KvStore for HookedStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.inner.set_if_exists(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        self.inner.delete_many(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.inner.incr_by(key, delta).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn hset(&self, key: &str, field: &str, value: CacheValue) -> Result<bool> {
        self.inner.hset(key, field, value).await
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, CacheValue)]) -> Result<()> {
        self.inner.hset_multiple(key, fields).await?;
        self.after(HookOp::HSetMultiple, key).await;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>> {
        self.inner.hget(key, field).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>> {
        let fields = self.inner.hgetall(key).await?;
        self.after(HookOp::HGetAll, key).await;
        Ok(fields)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.inner.hdel(key, field).await
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let value = self.inner.hincr_by(key, field, delta).await?;
        self.after(HookOp::HIncrBy, key).await;
        Ok(value)
    }

    async fn lpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        self.inner.lpush(key, value).await
    }

    async fn rpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        self.inner.rpush(key, value).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.lpop(key).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.rpop(key).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>> {
        self.inner.lrange(key, start, stop).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        self.inner.llen(key).await
    }

    async fn dbsize(&self) -> Result<usize> {
        self.inner.dbsize().await
    }

    async fn ping(&self) -> Result<String> {
        self.inner.ping().await
    }

    async fn info(&self) -> Result<StoreInfo> {
        self.inner.info().await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.inner.purge_expired().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
