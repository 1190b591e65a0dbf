//! In-memory cache store, the fallback when durable storage is unavailable.
//!
//! Same semantics as the SQLite store, including eviction pressure and the
//! stale sweep, but nothing survives the process.

use super::entry::CacheEntry;
use super::eviction;
use super::traits::{CacheStats, CacheStore, StoreLimits};
use crate::error::{PulseError, Result};
use crate::models::{DataType, DateRange};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Map-backed cache store.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    limits: StoreLimits,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits,
        }
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|e| PulseError::Other(format!("Cache map poisoned: {}", e)))
    }

    fn maybe_evict(&self, entries: &mut HashMap<String, CacheEntry>) {
        let snapshot: Vec<CacheEntry> = entries.values().cloned().collect();
        let keys = eviction::pressure_plan(&snapshot, &self.limits, Utc::now());
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            entries.remove(key);
        }
        debug!("Evicted {} cache entries under pressure", keys.len());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut entries = self.lock_entries()?;
        let touched = match entries.get(key) {
            Some(entry) => entry.touch(),
            None => return Ok(None),
        };
        entries.insert(key.to_string(), touched.clone());
        Ok(Some(touched))
    }

    fn get_by_date_range(
        &self,
        repository_id: &str,
        data_type: DataType,
        range: &DateRange,
    ) -> Result<Option<CacheEntry>> {
        self.get(&CacheEntry::build_key(repository_id, data_type, range))
    }

    fn set(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.lock_entries()?;
        entries.insert(entry.key.clone(), entry);
        self.maybe_evict(&mut entries);
        Ok(())
    }

    fn set_many(&self, batch: Vec<CacheEntry>) -> Result<()> {
        let mut entries = self.lock_entries()?;
        for entry in batch {
            entries.insert(entry.key.clone(), entry);
        }
        self.maybe_evict(&mut entries);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<CacheEntry>> {
        let entries = self.lock_entries()?;
        Ok(entries.values().cloned().collect())
    }

    fn get_by_repository(&self, repository_id: &str) -> Result<Vec<CacheEntry>> {
        let entries = self.lock_entries()?;
        Ok(entries
            .values()
            .filter(|e| e.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<CacheStats> {
        let entries = self.lock_entries()?;
        Ok(CacheStats {
            total_entries: entries.len(),
            total_size_bytes: entries.values().map(|e| e.size_bytes).sum(),
            oldest_entry: entries.values().map(|e| e.cached_at).min(),
            newest_entry: entries.values().map(|e| e.cached_at).max(),
        })
    }

    fn evict(&self, keys: &[String]) -> Result<usize> {
        let mut entries = self.lock_entries()?;
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.lock_entries()?;
        Ok(entries.remove(key).is_some())
    }

    fn clear_repository(&self, repository_id: &str) -> Result<usize> {
        let mut entries = self.lock_entries()?;
        let before = entries.len();
        entries.retain(|_, e| e.repository_id != repository_id);
        Ok(before - entries.len())
    }

    fn clear_all(&self) -> Result<()> {
        let mut entries = self.lock_entries()?;
        entries.clear();
        Ok(())
    }

    fn cleanup_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.lock_entries()?;
        let snapshot: Vec<CacheEntry> = entries.values().cloned().collect();

        let keys: Vec<String> = eviction::stale_entries(&snapshot, now)
            .into_iter()
            .filter(|e| !e.is_revalidating)
            .map(|e| e.key.clone())
            .collect();

        for key in &keys {
            entries.remove(key);
        }
        if !keys.is_empty() {
            debug!("Swept {} stale cache entries", keys.len());
        }
        Ok(keys.len())
    }
}
