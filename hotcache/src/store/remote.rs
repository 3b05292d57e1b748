//! Redis-backed store for multi-instance deployments
//!
//! Every command runs under the configured timeout. Transient failures are
//! retried with backoff; once the budget is spent the call fails with
//! [`CacheError::BackingStoreUnavailable`]. Commands that are not idempotent
//! (increments, pushes, pops) are only retried when the connection was refused,
//! since a timed-out attempt may already have been applied by the server.

use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};
use crate::store::retry::RetryPolicy;
use crate::store::{validate_key, validate_ttl, KvStore};
use crate::types::{CacheValue, StoreInfo, Ttl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, ErrorKind, FromRedisValue, RedisError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// INFO fields surfaced through [`StoreInfo::details`]
const INFO_FIELDS: &[&str] = &[
    "redis_version",
    "connected_clients",
    "used_memory_human",
    "uptime_in_seconds",
    "expired_keys",
    "evicted_keys",
];

/// Whether a command may be replayed after an ambiguous failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Safe,
    OnlyIfNotSent,
}

/// Store backed by a Redis server
pub struct RedisStore {
    manager: ConnectionManager,
    policy: RetryPolicy,
    closed: AtomicBool,
    opened_at: DateTime<Utc>,
}

impl RedisStore {
    /// Connect to the server named by `config.url`
    pub async fn open(config: &RemoteConfig) -> Result<Arc<Self>> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| CacheError::ConfigError("remote store requires a url".to_string()))?;
        let client = Client::open(url)
            .map_err(|e| CacheError::ConfigError(format!("invalid redis url: {}", e)))?;
        let policy = RetryPolicy::from(config);

        info!(
            "Connecting to Redis (timeout: {:?}, retries: {})",
            policy.timeout, policy.max_retries
        );

        let mut attempt = 0;
        let manager = loop {
            attempt += 1;
            let reason =
                match tokio::time::timeout(policy.timeout, ConnectionManager::new(client.clone()))
                    .await
                {
                    Ok(Ok(manager)) => break manager,
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("connect timed out after {:?}", policy.timeout),
                };

            if attempt >= policy.max_attempts() {
                return Err(CacheError::BackingStoreUnavailable {
                    attempts: attempt,
                    reason,
                });
            }

            let delay = policy.backoff(attempt);
            warn!(
                "Redis connect failed (attempt {}/{}), retrying after {:?}: {}",
                attempt,
                policy.max_attempts(),
                delay,
                reason
            );
            tokio::time::sleep(delay).await;
        };

        info!("Successfully connected to Redis");

        Ok(Arc::new(Self {
            manager,
            policy,
            closed: AtomicBool::new(false),
            opened_at: Utc::now(),
        }))
    }

    /// Get the retry policy applied to each command
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Internal: run one command under the timeout and retry budget
    async fn query<T>(&self, key: &str, replay: Replay, cmd: &Cmd) -> Result<T>
    where
        T: FromRedisValue + Send,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::BackingStoreUnavailable {
                attempts: 0,
                reason: "store is closed".to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut conn = self.manager.clone();

            let (reason, retryable) =
                match tokio::time::timeout(self.policy.timeout, cmd.query_async::<_, T>(&mut conn))
                    .await
                {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(e)) if is_transient(&e) => {
                        let retryable = replay == Replay::Safe || e.is_connection_refusal();
                        (e.to_string(), retryable)
                    }
                    Ok(Err(e)) => return Err(classify(key, e)),
                    Err(_) => (
                        format!("timed out after {:?}", self.policy.timeout),
                        replay == Replay::Safe,
                    ),
                };

            if !retryable || attempt >= self.policy.max_attempts() {
                warn!("Redis command on '{}' failed after {} attempt(s): {}", key, attempt, reason);
                return Err(CacheError::BackingStoreUnavailable {
                    attempts: attempt,
                    reason,
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                "Redis command on '{}' failed (attempt {}/{}), retrying after {:?}: {}",
                key,
                attempt,
                self.policy.max_attempts(),
                delay,
                reason
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Failures worth another attempt
fn is_transient(e: &RedisError) -> bool {
    e.is_io_error()
        || e.is_timeout()
        || e.is_connection_dropped()
        || e.is_connection_refusal()
        || matches!(
            e.kind(),
            ErrorKind::TryAgain
                | ErrorKind::BusyLoadingError
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        )
}

/// Map server-side rejections onto the cache error taxonomy
fn classify(key: &str, e: RedisError) -> CacheError {
    let detail = e.detail().unwrap_or_default().to_ascii_lowercase();

    if e.code() == Some("WRONGTYPE") {
        CacheError::type_mismatch(key, "matching shape", "another shape")
    } else if detail.contains("not an integer") {
        CacheError::type_mismatch(key, "integer", "non-numeric string")
    } else if detail.contains("overflow") {
        CacheError::InvalidArgument(format!("increment of '{}' overflows", key))
    } else if e.kind() == ErrorKind::TypeError {
        CacheError::SerializationError(e.to_string())
    } else {
        CacheError::DriverError(e)
    }
}

/// PX argument for a TTL, never rounded down to zero
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(key, Replay::Safe, &cmd).await
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        validate_ttl(ttl)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        debug!("Setting key: {} (ttl: {:?})", key, ttl);
        self.query::<()>(key, Replay::Safe, &cmd).await
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        validate_key(key)?;
        validate_ttl(ttl)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("XX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let reply: Option<String> = self.query(key, Replay::Safe, &cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        for key in keys {
            validate_key(key)?;
        }

        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        let removed: i64 = self.query(&keys[0], Replay::Safe, &cmd).await?;
        Ok(removed.max(0) as usize)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        // SCAN instead of KEYS so a large keyspace never blocks the server
        let mut found = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(100);

            let (next_cursor, batch): (u64, Vec<String>) =
                self.query(pattern, Replay::Safe, &cmd).await?;
            found.extend(batch);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(found.into_iter().collect())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(delta);
        self.query(key, Replay::OnlyIfNotSent, &cmd).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Ttl>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);

        let millis: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(match millis {
            -2 => None,
            -1 => Some(Ttl::Persistent),
            ms => Some(Ttl::Remaining(Duration::from_millis(ms.max(0) as u64))),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        validate_key(key)?;
        validate_ttl(Some(ttl))?;

        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl_millis(ttl));
        let applied: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(applied == 1)
    }

    async fn hset(&self, key: &str, field: &str, value: CacheValue) -> Result<bool> {
        validate_key(key)?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        let added: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(added == 1)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, CacheValue)]) -> Result<()> {
        validate_key(key)?;
        if fields.is_empty() {
            return Err(CacheError::InvalidArgument(
                "hset_multiple requires at least one field".to_string(),
            ));
        }

        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value.as_slice());
        }
        self.query::<()>(key, Replay::Safe, &cmd).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.query(key, Replay::Safe, &cmd).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.query(key, Replay::Safe, &cmd).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        validate_key(key)?;
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(key).arg(field);
        let removed: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(removed > 0)
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        let mut cmd = redis::cmd("HINCRBY");
        cmd.arg(key).arg(field).arg(delta);
        self.query(key, Replay::OnlyIfNotSent, &cmd).await
    }

    async fn lpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        validate_key(key)?;
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key).arg(value);
        let len: i64 = self.query(key, Replay::OnlyIfNotSent, &cmd).await?;
        Ok(len.max(0) as usize)
    }

    async fn rpush(&self, key: &str, value: CacheValue) -> Result<usize> {
        validate_key(key)?;
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key).arg(value);
        let len: i64 = self.query(key, Replay::OnlyIfNotSent, &cmd).await?;
        Ok(len.max(0) as usize)
    }

    async fn lpop(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("LPOP");
        cmd.arg(key);
        self.query(key, Replay::OnlyIfNotSent, &cmd).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("RPOP");
        cmd.arg(key);
        self.query(key, Replay::OnlyIfNotSent, &cmd).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<CacheValue>> {
        validate_key(key)?;
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.query(key, Replay::Safe, &cmd).await
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        validate_key(key)?;
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(key);
        let len: i64 = self.query(key, Replay::Safe, &cmd).await?;
        Ok(len.max(0) as usize)
    }

    async fn dbsize(&self) -> Result<usize> {
        let count: i64 = self.query("*", Replay::Safe, &redis::cmd("DBSIZE")).await?;
        Ok(count.max(0) as usize)
    }

    async fn ping(&self) -> Result<String> {
        self.query("*", Replay::Safe, &redis::cmd("PING")).await
    }

    async fn info(&self) -> Result<StoreInfo> {
        let raw: String = self.query("*", Replay::Safe, &redis::cmd("INFO")).await?;
        let keys = self.dbsize().await?;

        let details: BTreeMap<String, String> = raw
            .lines()
            .filter_map(|line| line.split_once(':'))
            .filter(|(name, _)| INFO_FIELDS.contains(name))
            .map(|(name, value)| (name.to_string(), value.trim().to_string()))
            .collect();

        Ok(StoreInfo {
            backend: "redis".to_string(),
            keys,
            uptime_secs: (Utc::now() - self.opened_at).num_seconds().max(0) as u64,
            stats: None,
            details,
        })
    }

    async fn purge_expired(&self) -> Result<usize> {
        // The server expires keys on its own
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed Redis store");
        }
        Ok(())
    }
}
