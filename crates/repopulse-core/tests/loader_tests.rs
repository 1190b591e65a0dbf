//! Integration tests for the chunked historical loader, driven by a
//! scripted mock data source over the in-memory store.

use async_trait::async_trait;
use chrono::Utc;
use repopulse_core::{
    CacheEntry, CacheStats, CacheStore, CancellationToken, ChunkedHistoricalLoader, DataType,
    DateRange, DataSource, HistoricalLoad, LoadProgress, LoadStatus, MemoryStore, PulseError,
    RateLimitStatus, SourceError, SourceErrorKind, SourceResult,
};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted data source: fixed items per chunk, optional failing calls, an
/// optional cancellation trigger, and a queue of budget responses.
struct MockSource {
    items_per_chunk: usize,
    failing_calls: HashSet<usize>,
    cancel_after_fetches: Option<(usize, CancellationToken)>,
    budget_script: Mutex<VecDeque<SourceResult<RateLimitStatus>>>,
    fetch_calls: AtomicUsize,
    budget_calls: AtomicUsize,
}

impl MockSource {
    fn new(items_per_chunk: usize) -> Self {
        Self {
            items_per_chunk,
            failing_calls: HashSet::new(),
            cancel_after_fetches: None,
            budget_script: Mutex::new(VecDeque::new()),
            fetch_calls: AtomicUsize::new(0),
            budget_calls: AtomicUsize::new(0),
        }
    }

    /// Make the fetch with this zero-based call index fail.
    fn failing_call(mut self, call: usize) -> Self {
        self.failing_calls.insert(call);
        self
    }

    /// Cancel `token` once `count` fetches have completed.
    fn cancel_after(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after_fetches = Some((count, token));
        self
    }

    /// Queue budget responses, consumed one per check. When the queue runs
    /// dry the budget reads as healthy.
    fn budget(self, script: Vec<SourceResult<RateLimitStatus>>) -> Self {
        *self.budget_script.lock().unwrap() = script.into();
        self
    }

    fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn budget_checks(&self) -> usize {
        self.budget_calls.load(Ordering::SeqCst)
    }

    fn fetch(&self, range: &DateRange) -> SourceResult<Vec<Value>> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((count, token)) = &self.cancel_after_fetches {
            if call + 1 >= *count {
                token.cancel();
            }
        }

        if self.failing_calls.contains(&call) {
            return Err(SourceError::new(
                SourceErrorKind::Network,
                "scripted failure",
            ));
        }

        Ok((0..self.items_per_chunk)
            .map(|i| {
                json!({
                    "id": format!("{}-{}", range.start.timestamp(), i),
                    "created_at": range.start.to_rfc3339(),
                })
            })
            .collect())
    }
}

fn healthy_budget() -> RateLimitStatus {
    RateLimitStatus {
        remaining: 4_900,
        total: 5_000,
        reset_at: Utc::now() + chrono::Duration::hours(1),
    }
}

fn low_budget() -> RateLimitStatus {
    RateLimitStatus {
        remaining: 5,
        total: 100,
        reset_at: Utc::now() + chrono::Duration::hours(1),
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_pull_requests(
        &self,
        _repository_id: &str,
        range: &DateRange,
        _cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        self.fetch(range)
    }

    async fn fetch_deployments(
        &self,
        _repository_id: &str,
        range: &DateRange,
        _cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        self.fetch(range)
    }

    async fn fetch_commits(
        &self,
        _repository_id: &str,
        range: &DateRange,
        _cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        self.fetch(range)
    }

    async fn rate_limit_status(&self) -> SourceResult<RateLimitStatus> {
        self.budget_calls.fetch_add(1, Ordering::SeqCst);
        match self.budget_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(healthy_budget()),
        }
    }
}

const REPO: &str = "octo/dashboard";

fn day_range(days: i64) -> DateRange {
    let now = Utc::now();
    DateRange::new(now - chrono::Duration::days(days), now).unwrap()
}

fn loader_with(
    source: MockSource,
) -> (ChunkedHistoricalLoader, Arc<MemoryStore>, Arc<MockSource>) {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(source);
    let loader = ChunkedHistoricalLoader::new(store.clone(), source.clone());
    (loader, store, source)
}

async fn load(
    loader: &ChunkedHistoricalLoader,
    range: DateRange,
) -> repopulse_core::Result<HistoricalLoad> {
    loader
        .load_historical(REPO, DataType::Commits, range, None, None)
        .await
}

#[tokio::test]
async fn test_200_day_range_loads_three_chunks() {
    let (loader, store, source) = loader_with(MockSource::new(4));

    let result = load(&loader, day_range(200)).await.unwrap();

    assert_eq!(result.total_chunks, 3);
    assert_eq!(result.chunks_loaded, 3);
    assert_eq!(result.items.len(), 12);
    assert_eq!(result.status, LoadStatus::Completed);
    assert!(!result.from_cache);
    assert_eq!(source.fetches(), 3);

    // Each chunk was written through.
    assert_eq!(store.stats().unwrap().total_entries, 3);
}

#[tokio::test]
async fn test_second_pass_is_served_from_cache() {
    let (loader, _store, source) = loader_with(MockSource::new(4));
    let range = day_range(200);

    let first = load(&loader, range).await.unwrap();
    assert_eq!(source.fetches(), 3);

    let second = load(&loader, range).await.unwrap();

    // No further fetches: every chunk short-circuited on a cache hit.
    assert_eq!(source.fetches(), 3);
    assert!(second.from_cache);
    assert_eq!(second.status, LoadStatus::Completed);
    assert_eq!(second.items, first.items);
}

#[tokio::test]
async fn test_stale_hits_still_short_circuit() {
    let (loader, store, source) = loader_with(MockSource::new(4));
    let range = day_range(200);

    // Seed every chunk with an already expired entry.
    for chunk in range.split(90) {
        let mut entry = CacheEntry::new(
            REPO,
            DataType::Commits,
            chunk,
            json!([{"id": "seeded"}]),
            std::time::Duration::from_secs(60),
        )
        .unwrap();
        entry.expires_at = Utc::now() - chrono::Duration::hours(1);
        store.set(entry).unwrap();
    }

    let result = load(&loader, range).await.unwrap();

    assert_eq!(source.fetches(), 0);
    assert!(result.from_cache);
    assert_eq!(result.items.len(), 3);
    assert_eq!(result.status, LoadStatus::Completed);
}

#[tokio::test]
async fn test_failed_middle_chunk_contributes_zero_items() {
    let (loader, store, source) = loader_with(MockSource::new(4).failing_call(1));

    let result = load(&loader, day_range(200)).await.unwrap();

    // Chunks before and after the failure still load.
    assert_eq!(result.chunks_loaded, 3);
    assert_eq!(result.items.len(), 8);
    assert_eq!(result.status, LoadStatus::Completed);
    assert_eq!(source.fetches(), 3);

    // The failed chunk was not cached, so a later pass can retry it.
    assert_eq!(store.stats().unwrap().total_entries, 2);
}

#[tokio::test]
async fn test_cancelled_before_start_is_an_error() {
    let (loader, _store, source) = loader_with(MockSource::new(4));
    let token = CancellationToken::new();
    token.cancel();

    let err = loader
        .load_historical(REPO, DataType::Commits, day_range(200), Some(&token), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PulseError::LoadAborted));
    assert_eq!(source.fetches(), 0);
}

#[tokio::test]
async fn test_cancelled_mid_flight_returns_partial_result() {
    let token = CancellationToken::new();
    let (loader, _store, source) =
        loader_with(MockSource::new(4).cancel_after(1, token.clone()));

    let result = loader
        .load_historical(REPO, DataType::Commits, day_range(200), Some(&token), None)
        .await
        .unwrap();

    // Cancellation landed after chunk 0 finished; chunk 1 never started.
    assert_eq!(result.status, LoadStatus::Aborted);
    assert_eq!(result.chunks_loaded, 1);
    assert_eq!(result.items.len(), 4);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_low_budget_stops_at_checkpoint() {
    // Five chunks (400 days); budget checks land at chunk indexes 0, 2, 4.
    // The second check reports 5% remaining.
    let source = MockSource::new(4).budget(vec![Ok(healthy_budget()), Ok(low_budget())]);
    let (loader, _store, source) = loader_with(source);

    let result = load(&loader, day_range(400)).await.unwrap();

    assert_eq!(result.total_chunks, 5);
    assert_eq!(result.chunks_loaded, 2);
    assert_eq!(result.items.len(), 8);
    assert_eq!(result.status, LoadStatus::BudgetLimited);
    assert_eq!(source.budget_checks(), 2);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_budget_check_failure_does_not_block() {
    let source = MockSource::new(4).budget(vec![
        Err(SourceError::new(SourceErrorKind::Network, "offline")),
        Err(SourceError::new(SourceErrorKind::Timeout, "slow")),
    ]);
    let (loader, _store, _source) = loader_with(source);

    let result = load(&loader, day_range(200)).await.unwrap();

    assert_eq!(result.status, LoadStatus::Completed);
    assert_eq!(result.chunks_loaded, 3);
}

#[tokio::test]
async fn test_progress_fires_once_per_chunk_in_order() {
    let (loader, _store, _source) = loader_with(MockSource::new(4));
    let range = day_range(200);
    let chunks = range.split(90);

    let (tx, mut rx) = mpsc::channel::<LoadProgress>(16);
    loader
        .load_historical(REPO, DataType::Commits, range, None, Some(tx))
        .await
        .unwrap();

    let mut reports = Vec::new();
    while let Some(progress) = rx.recv().await {
        reports.push(progress);
    }

    assert_eq!(reports.len(), 3);
    for (i, progress) in reports.iter().enumerate() {
        assert_eq!(progress.chunk_index, i);
        assert_eq!(progress.total_chunks, 3);
        assert_eq!(progress.chunk_range, chunks[i]);
        assert_eq!(progress.items_in_chunk, 4);
        assert_eq!(progress.items_total, 4 * (i + 1));
        assert_eq!(progress.data_type, DataType::Commits);
    }
}

#[tokio::test]
async fn test_progress_stops_with_early_termination() {
    let source = MockSource::new(4).budget(vec![Ok(healthy_budget()), Ok(low_budget())]);
    let (loader, _store, _source) = loader_with(source);

    let (tx, mut rx) = mpsc::channel::<LoadProgress>(16);
    loader
        .load_historical(REPO, DataType::Commits, day_range(400), None, Some(tx))
        .await
        .unwrap();

    let mut count = 0;
    while rx.recv().await.is_some() {
        count += 1;
    }
    // Chunks skipped by the budget stop never report progress.
    assert_eq!(count, 2);
}

/// Store whose writes always fail, for exercising write-failure swallowing.
struct WriteFailStore {
    inner: MemoryStore,
}

impl CacheStore for WriteFailStore {
    fn get(&self, key: &str) -> repopulse_core::Result<Option<CacheEntry>> {
        self.inner.get(key)
    }
    fn get_by_date_range(
        &self,
        repository_id: &str,
        data_type: DataType,
        range: &DateRange,
    ) -> repopulse_core::Result<Option<CacheEntry>> {
        self.inner.get_by_date_range(repository_id, data_type, range)
    }
    fn set(&self, _entry: CacheEntry) -> repopulse_core::Result<()> {
        Err(PulseError::StorageFull {
            message: "no space".into(),
        })
    }
    fn set_many(&self, _entries: Vec<CacheEntry>) -> repopulse_core::Result<()> {
        Err(PulseError::StorageFull {
            message: "no space".into(),
        })
    }
    fn get_all(&self) -> repopulse_core::Result<Vec<CacheEntry>> {
        self.inner.get_all()
    }
    fn get_by_repository(&self, repository_id: &str) -> repopulse_core::Result<Vec<CacheEntry>> {
        self.inner.get_by_repository(repository_id)
    }
    fn stats(&self) -> repopulse_core::Result<CacheStats> {
        self.inner.stats()
    }
    fn evict(&self, keys: &[String]) -> repopulse_core::Result<usize> {
        self.inner.evict(keys)
    }
    fn delete(&self, key: &str) -> repopulse_core::Result<bool> {
        self.inner.delete(key)
    }
    fn clear_repository(&self, repository_id: &str) -> repopulse_core::Result<usize> {
        self.inner.clear_repository(repository_id)
    }
    fn clear_all(&self) -> repopulse_core::Result<()> {
        self.inner.clear_all()
    }
    fn cleanup_stale(&self) -> repopulse_core::Result<usize> {
        self.inner.cleanup_stale()
    }
}

#[tokio::test]
async fn test_cache_write_failure_is_swallowed() {
    let store = Arc::new(WriteFailStore {
        inner: MemoryStore::new(),
    });
    let source = Arc::new(MockSource::new(4));
    let loader = ChunkedHistoricalLoader::new(store, source.clone());

    let result = load(&loader, day_range(200)).await.unwrap();

    // Every chunk still loaded; the failed writes only cost cache reuse.
    assert_eq!(result.status, LoadStatus::Completed);
    assert_eq!(result.items.len(), 12);
    assert_eq!(source.fetches(), 3);
}
