//! # hotcache
//!
//! A TTL-aware key/value cache with a multi-device session registry and
//! hot-content leaderboards built on top of it.
//!
//! ## Features
//!
//! - String, hash and list entries with per-key TTL
//! - Lazy expiry on every access plus a background sweep
//! - Interchangeable in-process and Redis backends behind one async trait
//! - Bounded timeouts and retries with backoff for the Redis backend
//! - Sliding-expiry user sessions with per-user indexes
//! - Atomic engagement counters and weighted top-N rankings
//! - Background scheduler with deterministic shutdown
//!
//! ## Store primitives
//!
//! ```no_run
//! use hotcache::{CacheConfig, HotCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> hotcache::Result<()> {
//!     let cache = HotCache::open(CacheConfig::default()).await?;
//!
//!     cache.set("greeting", "hello", Some(Duration::from_secs(30))).await?;
//!     assert_eq!(cache.get("greeting").await?, Some(b"hello".to_vec()));
//!
//!     cache.set("counter", "10", None).await?;
//!     assert_eq!(cache.incr_by("counter", 5).await?, 15);
//!
//!     cache.close().await
//! }
//! ```
//!
//! ## Sessions
//!
//! ```no_run
//! use hotcache::{CacheConfig, DeviceInfo, HotCache};
//!
//! #[tokio::main]
//! async fn main() -> hotcache::Result<()> {
//!     let cache = HotCache::open(CacheConfig::default()).await?;
//!
//!     let phone = cache
//!         .create_session("user-1", DeviceInfo::new("phone", "ios", "10.0.0.2"))
//!         .await?;
//!     assert!(cache.is_user_online("user-1").await?);
//!
//!     // Heartbeat: slides the TTL, or returns None once the session ended
//!     cache.update_session_activity(&phone.session_id).await?;
//!
//!     cache.destroy_user_sessions("user-1").await?;
//!     cache.close().await
//! }
//! ```
//!
//! ## Rankings
//!
//! ```no_run
//! use hotcache::{CacheConfig, HotCache, StatsSnapshot};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> hotcache::Result<()> {
//!     let config = CacheConfig::builder()
//!         .ranked_content_types(["work"])
//!         .ranking_refresh_interval(Duration::from_secs(60))
//!         .build();
//!     let cache = HotCache::open(config).await?;
//!     cache.start_background()?;
//!
//!     cache
//!         .update_content_stats("w1", "work", StatsSnapshot { views: 1000, ..Default::default() })
//!         .await?;
//!     cache.increment_views("w1", "work", 50).await?;
//!
//!     cache.refresh_hot_ranking("work").await?;
//!     for item in cache.get_hot_content("work", 10).await? {
//!         println!("{} {}", item.content_id, item.score);
//!     }
//!
//!     cache.close().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engagement;
pub mod error;
pub mod facade;
pub mod keys;
pub mod ranking;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use codec::{Record, TypedValue, ValueKind};
pub use config::{Backend, CacheConfig, CacheConfigBuilder, RemoteConfig};
pub use engagement::{ContentStats, EngagementCounters, StatField, StatsSnapshot};
pub use error::{CacheError, Result};
pub use facade::HotCache;
pub use keys::KeyBuilder;
pub use ranking::{RankedItem, RankingEngine, RankingList, RankingWeights};
pub use scheduler::Scheduler;
pub use session::{DeviceInfo, Session, SessionRegistry};
pub use store::{KvStore, MemoryStore, RedisStore, RetryPolicy};
pub use types::{CacheKey, CacheStats, CacheValue, StoreInfo, Ttl};
