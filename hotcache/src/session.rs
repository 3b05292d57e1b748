//! Multi-device user sessions and derived presence
//!
//! Each session lives under `session:data:<sessionId>` as a versioned record
//! carrying the sliding TTL. A per-user index hash `session:user:<userId>`
//! maps session ids to their creation time. Index membership only changes
//! through single-field `hset`/`hdel` calls, so two devices logging in or out
//! at once never lose each other's update.

use crate::codec::{decode_record, encode_record, Record};
use crate::error::{CacheError, Result};
use crate::keys::{session_key, user_sessions_key};
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Device details supplied when a session is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub platform: String,
    pub ip: String,
    pub user_agent: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        device_id: impl Into<String>,
        platform: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            platform: platform.into(),
            ip: ip.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// One device's session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub device_id: String,
    pub platform: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl Record for Session {
    const SCHEMA: &'static str = "session";
    const VERSION: u32 = 1;
}

/// Session registry backed by a shared store
pub struct SessionRegistry {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionRegistry {
    /// Create a registry whose sessions slide by `ttl` on every touch
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn session_ttl(&self) -> Duration {
        self.ttl
    }

    fn deadline(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                CacheError::InvalidArgument(format!("session ttl {:?} out of range", self.ttl))
            })
    }

    /// Open a new session for `user_id` on the given device
    pub async fn create_session(&self, user_id: &str, device: DeviceInfo) -> Result<Session> {
        let index_key = user_sessions_key(user_id)?;
        let now = Utc::now();

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            device_id: device.device_id,
            platform: device.platform,
            ip: device.ip,
            user_agent: device.user_agent,
            created_at: now,
            last_active_at: now,
            expires_at: self.deadline(now)?,
        };

        // Data before index: a reader never sees an index member without data
        let key = session_key(&session.session_id)?;
        self.store
            .set(&key, encode_record(&session)?, Some(self.ttl))
            .await?;
        self.store
            .hset(
                &index_key,
                &session.session_id,
                now.timestamp_millis().to_string().into_bytes(),
            )
            .await?;
        self.store.expire(&index_key, self.ttl).await?;

        info!(
            "Created session {} for user {} on device {}",
            session.session_id, user_id, session.device_id
        );
        Ok(session)
    }

    /// Look up a live session
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let key = session_key(session_id)?;
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Live sessions for `user_id`, oldest first.
    ///
    /// Index members whose session has expired are removed from the index.
    pub async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let index_key = user_sessions_key(user_id)?;
        let ids: Vec<String> = self.store.hgetall(&index_key).await?.into_keys().collect();

        let lookups = ids.iter().map(|id| self.lookup_indexed(id));
        let found = try_join_all(lookups).await?;

        let now = Utc::now();
        let mut sessions = Vec::with_capacity(ids.len());
        for (id, session) in ids.iter().zip(found) {
            match session {
                Some(session) if !session.is_expired_at(now) => sessions.push(session),
                Some(_) => {}
                None => {
                    debug!("Pruning expired session {} from user {}", id, user_id);
                    self.store.hdel(&index_key, id).await?;
                }
            }
        }

        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    /// Fetch an indexed session; corrupt records are logged and skipped
    async fn lookup_indexed(&self, session_id: &str) -> Result<Option<Session>> {
        match self.get_session(session_id).await {
            Ok(session) => Ok(session),
            Err(CacheError::SerializationError(e)) => {
                warn!("Skipping unreadable session {}: {}", session_id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// True when at least one session for the user is live
    pub async fn is_user_online(&self, user_id: &str) -> Result<bool> {
        let index_key = user_sessions_key(user_id)?;
        let ids = self.store.hgetall(&index_key).await?;

        for id in ids.keys() {
            if self.store.exists(&session_key(id)?).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Number of live sessions for `user_id`
    pub async fn count_user_sessions(&self, user_id: &str) -> Result<usize> {
        Ok(self.get_user_sessions(user_id).await?.len())
    }

    /// Record activity and restart the TTL countdown.
    ///
    /// Returns `None` when the session has already ended; an ended session is
    /// never brought back.
    pub async fn update_session_activity(&self, session_id: &str) -> Result<Option<Session>> {
        let key = session_key(session_id)?;
        let Some(mut session) = self.get_session(session_id).await? else {
            debug!("Activity on ended session {}", session_id);
            return Ok(None);
        };

        let now = Utc::now();
        session.last_active_at = now;
        session.expires_at = self.deadline(now)?;

        let refreshed = self
            .store
            .set_if_exists(&key, encode_record(&session)?, Some(self.ttl))
            .await?;
        if !refreshed {
            debug!("Session {} ended before activity was recorded", session_id);
            return Ok(None);
        }

        self.store
            .expire(&user_sessions_key(&session.user_id)?, self.ttl)
            .await?;

        debug!("Refreshed session {} for user {}", session_id, session.user_id);
        Ok(Some(session))
    }

    /// End one session; returns whether it was live
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        let removed = self.store.delete(&session_key(session_id)?).await?;
        self.store
            .hdel(&user_sessions_key(&session.user_id)?, session_id)
            .await?;

        info!("Destroyed session {} for user {}", session_id, session.user_id);
        Ok(removed)
    }

    /// End every session of `user_id`; returns how many were indexed.
    ///
    /// All session records go in one atomic delete, so readers see every
    /// session or none. Index members are then removed one by one rather than
    /// dropping the whole index, which keeps a login racing this call listed.
    pub async fn destroy_user_sessions(&self, user_id: &str) -> Result<usize> {
        let index_key = user_sessions_key(user_id)?;
        let ids: Vec<String> = self.store.hgetall(&index_key).await?.into_keys().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let keys = ids
            .iter()
            .map(|id| session_key(id))
            .collect::<Result<Vec<_>>>()?;
        self.store.delete_many(&keys).await?;
        for id in &ids {
            self.store.hdel(&index_key, id).await?;
        }

        info!("Destroyed {} session(s) for user {}", ids.len(), user_id);
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::hooked::{HookOp, HookedStore};
    use futures::FutureExt;
    use crate::store::MemoryStore;

    fn registry(ttl: Duration) -> (Arc<MemoryStore>, SessionRegistry) {
        let store = MemoryStore::open();
        let registry = SessionRegistry::new(store.clone(), ttl);
        (store, registry)
    }

    fn device(id: &str) -> DeviceInfo {
        DeviceInfo::new(id, "ios", "10.0.0.1")
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (_, registry) = registry(Duration::from_secs(60));

        let session = registry
            .create_session("u1", device("phone").with_user_agent("app/1.0"))
            .await
            .unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.user_agent.as_deref(), Some("app/1.0"));
        assert!(session.expires_at > session.created_at);

        let loaded = registry.get_session(&session.session_id).await.unwrap();
        assert_eq!(loaded, Some(session));
        assert!(registry.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_activity_slides_ttl() {
        let (_, registry) = registry(Duration::from_secs(60));
        let session = registry.create_session("u1", device("phone")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let refreshed = registry
            .update_session_activity(&session.session_id)
            .await
            .unwrap()
            .unwrap();

        assert!(refreshed.last_active_at > session.last_active_at);
        assert!(refreshed.expires_at > session.expires_at);
        assert_eq!(refreshed.created_at, session.created_at);
    }

    #[tokio::test]
    async fn test_update_activity_on_destroyed_session() {
        let (store, registry) = registry(Duration::from_secs(60));
        let session = registry.create_session("u1", device("phone")).await.unwrap();

        assert!(registry.destroy_session(&session.session_id).await.unwrap());
        let result = registry
            .update_session_activity(&session.session_id)
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(!store
            .exists(&session_key(&session.session_id).unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_pruned() {
        let (store, registry) = registry(Duration::from_millis(50));
        registry.create_session("u1", device("phone")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(registry.get_user_sessions("u1").await.unwrap().is_empty());
        assert!(!registry.is_user_online("u1").await.unwrap());
        assert!(store.hgetall("session:user:u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_missing_session() {
        let (_, registry) = registry(Duration::from_secs(60));
        assert!(!registry.destroy_session("nope").await.unwrap());
        assert_eq!(registry.destroy_user_sessions("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_user_id() {
        let (_, registry) = registry(Duration::from_secs(60));
        let result = registry.create_session("a:b", device("phone")).await;
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_login_racing_logout_everywhere_stays_listed() {
        let store = HookedStore::new(HookOp::HGetAll, "session:user:u1", |inner| {
            async move {
                SessionRegistry::new(inner, Duration::from_secs(60))
                    .create_session("u1", device("tablet"))
                    .await
                    .unwrap();
            }
            .boxed()
        });
        let registry = SessionRegistry::new(store, Duration::from_secs(60));
        let phone = registry.create_session("u1", device("phone")).await.unwrap();

        assert_eq!(registry.destroy_user_sessions("u1").await.unwrap(), 1);

        assert!(registry.get_session(&phone.session_id).await.unwrap().is_none());
        let remaining = registry.get_user_sessions("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].device_id, "tablet");
        assert!(registry
            .get_session(&remaining[0].session_id)
            .await
            .unwrap()
            .is_some());
        assert!(registry.is_user_online("u1").await.unwrap());
    }
}
