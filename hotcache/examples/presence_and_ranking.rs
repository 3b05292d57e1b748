//! Walk through sessions, counters and rankings on the in-process store
//!
//! Run with:
//! ```bash
//! cargo run --example presence_and_ranking
//! ```
//!
//! Set `REDIS_URL` to run the same flow against a Redis server.

use anyhow::Result;
use hotcache::{CacheConfig, DeviceInfo, HotCache, StatsSnapshot};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("hotcache=debug"))
        .init();

    let mut builder = CacheConfig::builder()
        .session_ttl(Duration::from_secs(30 * 60))
        .ranked_content_types(["work"])
        .ranking_refresh_interval(Duration::from_secs(5));
    if let Ok(url) = std::env::var("REDIS_URL") {
        builder = builder.redis_url(url);
    }

    let cache = HotCache::open(builder.build()).await?;
    cache.start_background()?;

    println!("=== Presence ===\n");

    let phone = cache
        .create_session("alice", DeviceInfo::new("phone", "ios", "10.0.0.2"))
        .await?;
    cache
        .create_session(
            "alice",
            DeviceInfo::new("laptop", "web", "10.0.0.3").with_user_agent("Mozilla/5.0"),
        )
        .await?;

    println!("alice online: {}", cache.is_user_online("alice").await?);
    for session in cache.get_user_sessions("alice").await? {
        println!("  {} on {} ({})", session.session_id, session.device_id, session.platform);
    }

    cache.destroy_session(&phone.session_id).await?;
    println!("after phone logout: {} session(s)", cache.count_user_sessions("alice").await?);

    println!("\n=== Rankings ===\n");

    let works = [
        ("w1", StatsSnapshot { views: 1000, likes: 150, comments: 25, shares: 10, favorites: 80 }),
        ("w2", StatsSnapshot { views: 5000, likes: 20, comments: 2, shares: 1, favorites: 5 }),
        ("w3", StatsSnapshot { views: 300, likes: 90, comments: 60, shares: 40, favorites: 30 }),
    ];
    for (id, stats) in works {
        cache.update_content_stats(id, "work", stats).await?;
    }
    cache.increment_views("w3", "work", 250).await?;

    let ranking = cache.refresh_hot_ranking("work").await?;
    println!("computed at {}", ranking.computed_at);
    for (rank, item) in cache.get_hot_content("work", 10).await?.iter().enumerate() {
        println!("  {}. {} ({:.0})", rank + 1, item.content_id, item.score);
    }

    cache.clear_content_cache("w1", "work").await?;
    println!("\nafter clearing w1:");
    for item in cache.get_hot_content("work", 10).await? {
        println!("  {} ({:.0})", item.content_id, item.score);
    }

    println!("\n=== Store ===\n");
    print!("{}", cache.info().await?);

    cache.destroy_user_sessions("alice").await?;
    cache.close().await?;
    Ok(())
}
