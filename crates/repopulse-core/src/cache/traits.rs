//! Cache store trait and shared types.

use super::entry::CacheEntry;
use crate::config::EvictionConfig;
use crate::error::Result;
use crate::models::{DataType, DateRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime limits for one store instance.
///
/// Defaults come from [`EvictionConfig`]; tests and embedders can shrink
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreLimits {
    /// Maximum total cache size in bytes.
    pub max_size_bytes: u64,
    /// Maximum number of entries.
    pub max_entries: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: EvictionConfig::MAX_SIZE_BYTES,
            max_entries: EvictionConfig::MAX_ENTRIES,
        }
    }
}

/// Aggregate statistics over all entries in a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    /// `cached_at` of the oldest entry, if any.
    pub oldest_entry: Option<DateTime<Utc>>,
    /// `cached_at` of the newest entry, if any.
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Key-addressed storage for cache entries.
///
/// Two interchangeable implementations exist: the durable SQLite store and
/// an in-memory fallback. Consumers depend only on this trait and must not
/// branch on the backend. All operations are synchronous to match
/// rusqlite's API; callers in async contexts treat each call as a
/// suspension-point-free block.
///
/// Failure contract: write failures (quota, backend errors) surface to the
/// direct caller. Read failures caused by corrupt records are reported as
/// a miss, never as a fatal error — the cache is a performance layer, not a
/// correctness dependency.
pub trait CacheStore: Send + Sync {
    /// Get an entry by key, refreshing its access time.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Get the entry exactly matching a repository, data type, and range.
    fn get_by_date_range(
        &self,
        repository_id: &str,
        data_type: DataType,
        range: &DateRange,
    ) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry by key, applying eviction pressure
    /// afterwards.
    fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Insert or replace a batch of entries atomically from the caller's
    /// perspective.
    fn set_many(&self, entries: Vec<CacheEntry>) -> Result<()>;

    /// Snapshot of every entry. Does not refresh access times.
    fn get_all(&self) -> Result<Vec<CacheEntry>>;

    /// Snapshot of every entry for one repository. Does not refresh access
    /// times.
    fn get_by_repository(&self, repository_id: &str) -> Result<Vec<CacheEntry>>;

    /// Aggregate statistics.
    fn stats(&self) -> Result<CacheStats>;

    /// Remove the given keys. Returns how many existed.
    fn evict(&self, keys: &[String]) -> Result<usize>;

    /// Remove one key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry for one repository. Returns how many were removed.
    fn clear_repository(&self, repository_id: &str) -> Result<usize>;

    /// Remove everything.
    fn clear_all(&self) -> Result<()>;

    /// Remove expired entries that have no refresh in flight. Returns how
    /// many were removed.
    fn cleanup_stale(&self) -> Result<usize>;
}
