//! Chunked historical loader.
//!
//! Fetches a wide date range of one data type for one repository in 90-day
//! chunks, preferring cache hits, pacing itself against the upstream
//! rate-limit budget, reporting per-chunk progress, and supporting
//! cooperative cancellation at chunk boundaries.
//!
//! Degraded outcomes are data, not errors: cancellation mid-flight and
//! budget exhaustion return whatever accumulated so far, tagged with a
//! [`LoadStatus`]. Only cancellation before the first chunk is an error.

use crate::cache::{CacheEntry, CacheStore};
use crate::cancel::CancellationToken;
use crate::config::{EvictionConfig, LoaderConfig, RepoActivity};
use crate::error::Result;
use crate::models::{DataType, DateRange};
use crate::source::DataSource;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress of a running load, sent once per processed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProgress {
    /// Zero-based index of the chunk just processed.
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub data_type: DataType,
    pub chunk_range: DateRange,
    /// Items this chunk contributed.
    pub items_in_chunk: usize,
    /// Cumulative items so far.
    pub items_total: usize,
}

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Every chunk was processed.
    Completed,
    /// Stopped early because the upstream request budget ran low. A normal
    /// outcome, not a failure.
    BudgetLimited,
    /// Cancelled after at least the first chunk boundary was reached.
    Aborted,
}

/// Outcome of a historical load: the accumulated items plus enough metadata
/// for the caller to judge how complete they are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalLoad {
    pub data_type: DataType,
    /// Items in chunk order; within a chunk, source order is preserved.
    pub items: Vec<Value>,
    /// Chunks actually processed; equals `total_chunks` when `Completed`.
    pub chunks_loaded: usize,
    pub total_chunks: usize,
    /// True iff every processed chunk was served from the cache.
    pub from_cache: bool,
    pub status: LoadStatus,
}

/// Loads wide historical ranges chunk by chunk through the cache.
///
/// Chunks are processed strictly sequentially within one invocation so the
/// budget checks stay meaningful and progress stays monotonic. Independent
/// invocations for different repository/data-type pairs may run
/// concurrently; the store tolerates that.
pub struct ChunkedHistoricalLoader {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn DataSource>,
    activity: RepoActivity,
}

impl ChunkedHistoricalLoader {
    pub fn new(store: Arc<dyn CacheStore>, source: Arc<dyn DataSource>) -> Self {
        Self {
            store,
            source,
            activity: RepoActivity::default(),
        }
    }

    /// Tag the repository's activity class, which selects the TTL for
    /// freshly cached chunks.
    pub fn with_activity(mut self, activity: RepoActivity) -> Self {
        self.activity = activity;
        self
    }

    /// Load `range` of `data_type` for `repository_id`.
    ///
    /// Returns an error only for cancellation before any work started;
    /// every other failure mode degrades to a partial result. A fresh call
    /// always restarts chunking from the beginning of the range, relying on
    /// the cache to make already-fetched chunks fast.
    pub async fn load_historical(
        &self,
        repository_id: &str,
        data_type: DataType,
        range: DateRange,
        cancel: Option<&CancellationToken>,
        progress: Option<mpsc::Sender<LoadProgress>>,
    ) -> Result<HistoricalLoad> {
        let never_cancelled = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never_cancelled);
        cancel.check()?;

        let chunks = range.split(LoaderConfig::CHUNK_DAYS);
        let total_chunks = chunks.len();
        debug!(
            "Loading {} for {} over {} in {} chunk(s)",
            data_type, repository_id, range, total_chunks
        );

        let mut items: Vec<Value> = Vec::new();
        let mut chunks_loaded = 0;
        let mut from_cache = true;
        let mut status = LoadStatus::Completed;

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Load of {} for {} cancelled at chunk {}/{}",
                    data_type, repository_id, index, total_chunks
                );
                status = LoadStatus::Aborted;
                break;
            }

            if index % LoaderConfig::RATE_CHECK_INTERVAL == 0 {
                match self.source.rate_limit_status().await {
                    Ok(budget) => {
                        if budget.remaining_fraction() < LoaderConfig::MIN_BUDGET_FRACTION {
                            info!(
                                "Rate-limit budget low ({}/{}), stopping at chunk {}/{}",
                                budget.remaining, budget.total, index, total_chunks
                            );
                            status = LoadStatus::BudgetLimited;
                            break;
                        }
                    }
                    // The budget is a side-channel; don't block progress on
                    // it being unreachable.
                    Err(e) => warn!("Rate-limit check failed, continuing: {}", e),
                }
            }

            let chunk_items = match self.cached_chunk(repository_id, data_type, chunk) {
                Some(cached) => cached,
                None => {
                    from_cache = false;
                    self.fetch_and_cache(repository_id, data_type, chunk, cancel)
                        .await
                }
            };

            let items_in_chunk = chunk_items.len();
            items.extend(chunk_items);
            chunks_loaded += 1;

            if let Some(ref tx) = progress {
                let _ = tx
                    .send(LoadProgress {
                        chunk_index: index,
                        total_chunks,
                        data_type,
                        chunk_range: *chunk,
                        items_in_chunk,
                        items_total: items.len(),
                    })
                    .await;
            }
        }

        info!(
            "Loaded {} {} items for {} ({}/{} chunks, {:?})",
            items.len(),
            data_type,
            repository_id,
            chunks_loaded,
            total_chunks,
            status
        );

        Ok(HistoricalLoad {
            data_type,
            items,
            chunks_loaded,
            total_chunks,
            from_cache,
            status,
        })
    }

    /// Look a chunk up in the cache. A hit, fresh or stale, short-circuits
    /// the network fetch; a failed read is just a miss.
    fn cached_chunk(
        &self,
        repository_id: &str,
        data_type: DataType,
        chunk: &DateRange,
    ) -> Option<Vec<Value>> {
        match self.store.get_by_date_range(repository_id, data_type, chunk) {
            Ok(Some(entry)) => {
                debug!(
                    "Cache hit ({}) for {} chunk {}",
                    if entry.is_stale() { "stale" } else { "fresh" },
                    data_type,
                    chunk
                );
                Some(entry_items(&entry))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for chunk {}: {}", chunk, e);
                None
            }
        }
    }

    /// Fetch a chunk from the upstream source and write it through the
    /// cache. A failed fetch degrades to an empty chunk; a failed cache
    /// write is logged and swallowed.
    async fn fetch_and_cache(
        &self,
        repository_id: &str,
        data_type: DataType,
        chunk: &DateRange,
        cancel: &CancellationToken,
    ) -> Vec<Value> {
        let fetched = match data_type {
            DataType::PullRequests => {
                self.source
                    .fetch_pull_requests(repository_id, chunk, cancel)
                    .await
            }
            DataType::Deployments => {
                self.source
                    .fetch_deployments(repository_id, chunk, cancel)
                    .await
            }
            DataType::Commits => self.source.fetch_commits(repository_id, chunk, cancel).await,
        };

        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "Fetch failed for {} chunk {} of {}: {}; treating as empty",
                    data_type, chunk, repository_id, e
                );
                return Vec::new();
            }
        };

        let ttl = EvictionConfig::ttl_for(self.activity, chunk, Utc::now());
        match CacheEntry::new(
            repository_id,
            data_type,
            *chunk,
            Value::Array(items.clone()),
            ttl,
        ) {
            Ok(entry) => {
                if let Err(e) = self.store.set(entry) {
                    warn!("Cache write failed for chunk {}: {}", chunk, e);
                }
            }
            Err(e) => warn!("Could not build cache entry for chunk {}: {}", chunk, e),
        }

        items
    }
}

fn entry_items(entry: &CacheEntry) -> Vec<Value> {
    entry.data.as_array().cloned().unwrap_or_default()
}
