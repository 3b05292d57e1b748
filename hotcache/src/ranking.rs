//! Hot-content leaderboards derived from engagement counters
//!
//! A refresh scans the per-type content index, scores each item as a weighted
//! sum of its counters, keeps the top N and replaces `ranking:hot:<type>` with
//! a single `set`. Readers therefore see either the previous snapshot or the
//! new one, never a mix. Nothing refreshes on counter writes; rankings are as
//! fresh as the last explicit or scheduled refresh.

use crate::codec::{decode_record, encode_record, Record};
use crate::engagement::{ContentStats, EngagementCounters};
use crate::error::{CacheError, Result};
use crate::keys::hot_ranking_key;
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-counter score weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub views: f64,
    pub likes: f64,
    pub comments: f64,
    pub shares: f64,
    pub favorites: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            views: 1.0,
            likes: 5.0,
            comments: 8.0,
            shares: 10.0,
            favorites: 6.0,
        }
    }
}

impl RankingWeights {
    /// Weights must be finite and non-negative
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("views", self.views),
            ("likes", self.likes),
            ("comments", self.comments),
            ("shares", self.shares),
            ("favorites", self.favorites),
        ];

        for (name, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CacheError::ConfigError(format!(
                    "ranking weight for {} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }

    pub fn score(&self, stats: &ContentStats) -> f64 {
        self.views * stats.views as f64
            + self.likes * stats.likes as f64
            + self.comments * stats.comments as f64
            + self.shares * stats.shares as f64
            + self.favorites * stats.favorites as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub content_id: String,
    pub score: f64,
}

/// Cached top-N for one content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingList {
    pub content_type: String,
    pub items: Vec<RankedItem>,
    pub computed_at: DateTime<Utc>,
}

impl Record for RankingList {
    const SCHEMA: &'static str = "ranking";
    const VERSION: u32 = 1;
}

/// Higher score first, then most recently updated, then content id
fn rank_order(a: &(ContentStats, f64), b: &(ContentStats, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
        .then_with(|| a.0.content_id.cmp(&b.0.content_id))
}

/// Remove `content_id` from the cached ranking of `content_type`, if cached.
///
/// A refresh running at the same time may write the id back; the next
/// refresh drops it because its counters are gone.
pub(crate) async fn strip_from_ranking(
    store: &dyn KvStore,
    content_type: &str,
    content_id: &str,
) -> Result<bool> {
    let key = hot_ranking_key(content_type)?;
    let Some(bytes) = store.get(&key).await? else {
        return Ok(false);
    };

    let mut ranking: RankingList = decode_record(&bytes)?;
    let before = ranking.items.len();
    ranking.items.retain(|item| item.content_id != content_id);
    if ranking.items.len() == before {
        return Ok(false);
    }

    store.set(&key, encode_record(&ranking)?, None).await?;
    debug!("Removed {} from {} ranking", content_id, content_type);
    Ok(true)
}

/// Computes and serves hot-content rankings
pub struct RankingEngine {
    store: Arc<dyn KvStore>,
    counters: EngagementCounters,
    weights: RankingWeights,
    capacity: usize,
    content_types: Vec<String>,
}

impl RankingEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        counters: EngagementCounters,
        weights: RankingWeights,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            counters,
            weights,
            capacity,
            content_types: Vec::new(),
        }
    }

    /// Content types covered by [`refresh_all`](Self::refresh_all)
    pub fn with_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// Recompute the top N for `content_type` and replace the cached ranking
    pub async fn refresh_hot_ranking(&self, content_type: &str) -> Result<RankingList> {
        let key = hot_ranking_key(content_type)?;
        let ids = self.counters.content_ids(content_type).await?;
        let scanned = self.counters.scan_indexed(&ids, content_type).await?;

        let mut scored: Vec<(ContentStats, f64)> = Vec::with_capacity(scanned.len());
        for (id, stats) in scanned {
            match stats {
                Some(stats) => {
                    let score = self.weights.score(&stats);
                    scored.push((stats, score));
                }
                None => {
                    debug!("Dropping {} {} from index: counters expired", content_type, id);
                    self.counters.forget(&id, content_type).await?;
                }
            }
        }
        scored.sort_by(rank_order);
        scored.truncate(self.capacity);

        let ranking = RankingList {
            content_type: content_type.to_string(),
            items: scored
                .into_iter()
                .map(|(stats, score)| RankedItem {
                    content_id: stats.content_id,
                    score,
                })
                .collect(),
            computed_at: Utc::now(),
        };

        self.store.set(&key, encode_record(&ranking)?, None).await?;

        info!(
            "Refreshed {} ranking: {} of {} item(s)",
            content_type,
            ranking.items.len(),
            ids.len()
        );
        Ok(ranking)
    }

    /// Last computed ranking, or `None` if none has been computed
    pub async fn get_ranking(&self, content_type: &str) -> Result<Option<RankingList>> {
        let key = hot_ranking_key(content_type)?;
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The first `count` entries of the last computed ranking
    pub async fn get_hot_content(
        &self,
        content_type: &str,
        count: usize,
    ) -> Result<Vec<RankedItem>> {
        let mut items = self
            .get_ranking(content_type)
            .await?
            .map(|ranking| ranking.items)
            .unwrap_or_default();
        items.truncate(count);
        Ok(items)
    }

    /// Remove one id from the cached ranking without a rescan
    pub async fn remove_from_ranking(&self, content_type: &str, content_id: &str) -> Result<bool> {
        strip_from_ranking(self.store.as_ref(), content_type, content_id).await
    }

    /// Refresh every configured content type; returns how many succeeded.
    ///
    /// A failing type is logged and does not stop the others. If every type
    /// fails, the last error is returned.
    pub async fn refresh_all(&self) -> Result<usize> {
        let mut refreshed = 0;
        let mut last_error = None;

        for content_type in &self.content_types {
            match self.refresh_hot_ranking(content_type).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    warn!("Failed to refresh {} ranking: {}", content_type, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if refreshed == 0 => Err(e),
            _ => Ok(refreshed),
        }
    }
}
