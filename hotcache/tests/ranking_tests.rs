//! Integration tests for engagement counters and hot rankings

use futures::future::join_all;
use hotcache::{CacheConfig, HotCache, RankingWeights, StatField, StatsSnapshot};
use std::sync::Arc;
use std::time::Duration;

fn snapshot(views: i64, likes: i64, comments: i64, shares: i64, favorites: i64) -> StatsSnapshot {
    StatsSnapshot {
        views,
        likes,
        comments,
        shares,
        favorites,
    }
}

#[tokio::test]
async fn test_increment_after_snapshot() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache
        .update_content_stats("w1", "work", snapshot(1000, 150, 25, 10, 80))
        .await
        .unwrap();
    assert_eq!(cache.increment_views("w1", "work", 50).await.unwrap(), 1050);

    let stats = cache.get_content_stats("w1", "work").await.unwrap().unwrap();
    assert_eq!(stats.views, 1050);
    assert_eq!(stats.likes, 150);
    assert_eq!(stats.comments, 25);
    assert_eq!(stats.shares, 10);
    assert_eq!(stats.favorites, 80);
    assert_eq!(stats.content_type, "work");
}

#[tokio::test]
async fn test_snapshot_overwrites_increments() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_likes("w1", "work", 7).await.unwrap();
    cache
        .update_content_stats("w1", "work", snapshot(1, 2, 3, 4, 5))
        .await
        .unwrap();

    let stats = cache.get_content_stats("w1", "work").await.unwrap().unwrap();
    assert_eq!(stats.snapshot(), snapshot(1, 2, 3, 4, 5));
}

#[tokio::test]
async fn test_batch_skips_missing_ids() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_views("a", "post", 1).await.unwrap();
    cache.increment_views("c", "post", 3).await.unwrap();

    let batch = cache
        .get_batch_content_stats(&["a", "b", "c"], "post")
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["a"].views, 1);
    assert_eq!(batch["c"].views, 3);
    assert!(!batch.contains_key("b"));
}

#[tokio::test]
async fn test_counters_scoped_by_type() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_views("x1", "work", 5).await.unwrap();
    assert!(cache.get_content_stats("x1", "post").await.unwrap().is_none());
}

#[tokio::test]
async fn test_ranking_sorted_and_cleared_item_dropped() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache
        .update_content_stats("low", "work", snapshot(10, 0, 0, 0, 0))
        .await
        .unwrap();
    cache
        .update_content_stats("mid", "work", snapshot(100, 10, 0, 0, 0))
        .await
        .unwrap();
    cache
        .update_content_stats("top", "work", snapshot(1000, 150, 25, 10, 80))
        .await
        .unwrap();

    cache.refresh_hot_ranking("work").await.unwrap();
    let hot = cache.get_hot_content("work", 5).await.unwrap();
    let ids: Vec<&str> = hot.iter().map(|item| item.content_id.as_str()).collect();
    assert_eq!(ids, vec!["top", "mid", "low"]);
    assert!(hot.windows(2).all(|pair| pair[0].score > pair[1].score));

    // Clearing removes it from the cached ranking straight away
    assert!(cache.clear_content_cache("top", "work").await.unwrap());
    let hot = cache.get_hot_content("work", 5).await.unwrap();
    assert!(hot.iter().all(|item| item.content_id != "top"));

    cache.refresh_hot_ranking("work").await.unwrap();
    let hot = cache.get_hot_content("work", 5).await.unwrap();
    let ids: Vec<&str> = hot.iter().map(|item| item.content_id.as_str()).collect();
    assert_eq!(ids, vec!["mid", "low"]);
}

#[tokio::test]
async fn test_hot_content_is_not_rescanned_on_read() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_views("a", "work", 10).await.unwrap();
    let before = cache.refresh_hot_ranking("work").await.unwrap();

    cache.increment_views("b", "work", 500).await.unwrap();
    let hot = cache.get_hot_content("work", 5).await.unwrap();
    assert_eq!(hot.len(), 1);
    assert_eq!(hot[0].content_id, "a");

    let ranking = cache.get_ranking("work").await.unwrap().unwrap();
    assert_eq!(ranking.computed_at, before.computed_at);

    cache.refresh_hot_ranking("work").await.unwrap();
    assert_eq!(cache.get_hot_content("work", 5).await.unwrap()[0].content_id, "b");
}

#[tokio::test]
async fn test_equal_scores_prefer_recent_updates() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_views("older", "work", 10).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.increment_views("newer", "work", 10).await.unwrap();

    cache.refresh_hot_ranking("work").await.unwrap();
    let hot = cache.get_hot_content("work", 5).await.unwrap();
    assert_eq!(hot[0].content_id, "newer");
    assert_eq!(hot[1].content_id, "older");
    assert_eq!(hot[0].score, hot[1].score);
}

#[tokio::test]
async fn test_custom_weights() {
    let config = CacheConfig::builder()
        .ranking_weights(RankingWeights {
            views: 0.0,
            likes: 0.0,
            comments: 0.0,
            shares: 1.0,
            favorites: 0.0,
        })
        .build();
    let cache = HotCache::open(config).await.unwrap();

    cache
        .update_content_stats("viral", "post", snapshot(0, 0, 0, 50, 0))
        .await
        .unwrap();
    cache
        .update_content_stats("viewed", "post", snapshot(10_000, 0, 0, 1, 0))
        .await
        .unwrap();

    cache.refresh_hot_ranking("post").await.unwrap();
    let hot = cache.get_hot_content("post", 1).await.unwrap();
    assert_eq!(hot[0].content_id, "viral");
    assert_eq!(hot[0].score, 50.0);
}

#[tokio::test]
async fn test_scheduled_refresh() {
    let config = CacheConfig::builder()
        .ranked_content_types(["work"])
        .ranking_refresh_interval(Duration::from_millis(50))
        .enable_auto_sweep(false)
        .build();
    let cache = HotCache::open(config).await.unwrap();
    cache.start_background().unwrap();
    assert_eq!(cache.background_tasks(), 1);

    cache.increment_views("w1", "work", 3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let hot = cache.get_hot_content("work", 5).await.unwrap();
    assert_eq!(hot.len(), 1);
    assert_eq!(hot[0].content_id, "w1");

    cache.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_increments() {
    let cache = Arc::new(HotCache::open(CacheConfig::testing()).await.unwrap());

    let tasks = (0..10).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                cache
                    .increment("w1", "work", StatField::Likes, 2)
                    .await
                    .unwrap();
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let stats = cache.get_content_stats("w1", "work").await.unwrap().unwrap();
    assert_eq!(stats.likes, 1000);
}

#[tokio::test]
async fn test_refresh_skips_unreadable_counters() {
    let cache = HotCache::open(CacheConfig::testing()).await.unwrap();

    cache.increment_views("good", "work", 3).await.unwrap();
    cache.increment_views("bad", "work", 5).await.unwrap();
    cache
        .hset("content:stats:work:bad", "views", "lots")
        .await
        .unwrap();

    let ranking = cache.refresh_hot_ranking("work").await.unwrap();
    let ids: Vec<_> = ranking.items.iter().map(|i| i.content_id.as_str()).collect();
    assert_eq!(ids, vec!["good"]);
    assert_eq!(cache.get_hot_content("work", 10).await.unwrap().len(), 1);

    // Single lookups still report the damage
    assert!(cache.get_content_stats("bad", "work").await.is_err());
}
