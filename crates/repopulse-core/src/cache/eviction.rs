//! Cache eviction policy: scoring and candidate selection.
//!
//! Pure functions over a snapshot of entries supplied by the caller; no
//! storage or network I/O happens here. Higher score = evicted sooner.
//! Staleness dominates recency, and entries with a refresh in flight are
//! heavily protected but not exempt.

use super::entry::CacheEntry;
use super::traits::StoreLimits;
use crate::config::EvictionConfig;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Whether total size has crossed the eviction trigger threshold.
pub fn should_evict(current_size_bytes: u64, max_size_bytes: u64) -> bool {
    current_size_bytes as f64 >= max_size_bytes as f64 * EvictionConfig::TRIGGER_THRESHOLD
}

/// Whether entry count has crossed the eviction trigger threshold.
pub fn should_evict_by_count(current_count: usize, max_entries: usize) -> bool {
    current_count as f64 >= max_entries as f64 * EvictionConfig::TRIGGER_THRESHOLD
}

/// Eviction priority of a single entry at `now`.
pub fn score(entry: &CacheEntry, now: DateTime<Utc>) -> f64 {
    let days_idle = (now - entry.last_accessed_at).num_seconds().max(0) as f64 / 86_400.0;
    let mut score = days_idle;
    if entry.is_stale_at(now) {
        score += EvictionConfig::STALE_BOOST;
    }
    if entry.is_revalidating {
        score -= EvictionConfig::REVALIDATING_PENALTY;
    }
    score
}

/// Keys to evict so that total size drops to at most `target_bytes`.
///
/// Returns the minimal prefix of entries in descending score order whose
/// removal reaches the target: the empty set when already at or under the
/// target, and never a set whose last element was unnecessary. Equal scores
/// keep their input order.
pub fn candidates_for_size_target(
    entries: &[CacheEntry],
    target_bytes: u64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    if total <= target_bytes {
        return Vec::new();
    }
    let excess = total - target_bytes;

    let mut freed = 0u64;
    let mut keys = Vec::new();
    for entry in by_score_descending(entries, now) {
        if freed >= excess {
            break;
        }
        freed += entry.size_bytes;
        keys.push(entry.key.clone());
    }
    keys
}

/// Keys to evict so that entry count drops to at most `target_count`.
pub fn candidates_for_count_target(
    entries: &[CacheEntry],
    target_count: usize,
    now: DateTime<Utc>,
) -> Vec<String> {
    if entries.len() <= target_count {
        return Vec::new();
    }
    let excess = entries.len() - target_count;
    by_score_descending(entries, now)
        .into_iter()
        .take(excess)
        .map(|e| e.key.clone())
        .collect()
}

/// Entries past their expiry, for opportunistic sweeping independent of
/// size pressure.
pub fn stale_entries<'a>(entries: &'a [CacheEntry], now: DateTime<Utc>) -> Vec<&'a CacheEntry> {
    entries.iter().filter(|e| e.is_stale_at(now)).collect()
}

/// Cache usage as a percentage of the size limit. Observability only.
pub fn usage_percentage(current_bytes: u64, max_bytes: u64) -> f64 {
    if max_bytes == 0 {
        return 0.0;
    }
    100.0 * current_bytes as f64 / max_bytes as f64
}

/// Full eviction plan for a snapshot under the given limits: size pressure
/// first, then count pressure, deduplicated, highest priority first.
pub fn pressure_plan(
    entries: &[CacheEntry],
    limits: &StoreLimits,
    now: DateTime<Utc>,
) -> Vec<String> {
    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut keys = Vec::new();

    if should_evict(total_size, limits.max_size_bytes) {
        let target = (limits.max_size_bytes as f64 * EvictionConfig::TARGET_FRACTION) as u64;
        keys = candidates_for_size_target(entries, target, now);
    }

    if should_evict_by_count(entries.len(), limits.max_entries) {
        let target = (limits.max_entries as f64 * EvictionConfig::TARGET_FRACTION) as usize;
        for key in candidates_for_count_target(entries, target, now) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    keys
}

fn by_score_descending(entries: &[CacheEntry], now: DateTime<Utc>) -> Vec<&CacheEntry> {
    let mut scored: Vec<(&CacheEntry, f64)> =
        entries.iter().map(|e| (e, score(e, now))).collect();
    // Stable sort: ties keep input order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(e, _)| e).collect()
}
