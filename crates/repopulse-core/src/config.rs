//! Centralized configuration for the RepoPulse data core.
//!
//! Tuning constants for cache eviction, the chunked historical loader, and
//! the upstream data source. These are process-wide constants; per-store
//! runtime limits live in [`crate::cache::StoreLimits`].

use crate::models::DateRange;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Cache eviction tuning.
pub struct EvictionConfig;

impl EvictionConfig {
    /// TTL for chunks of repositories with ongoing activity (6 hours).
    pub const ACTIVE_REPO_TTL: Duration = Duration::from_secs(6 * 60 * 60);
    /// TTL for chunks of archived repositories (7 days).
    pub const ARCHIVED_REPO_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// TTL for historical windows old enough that their data no longer
    /// changes (30 days).
    pub const OLD_WINDOW_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
    /// A date range ending more than this many days ago is an "old" window.
    pub const OLD_WINDOW_AGE_DAYS: i64 = 90;

    /// Maximum total cache size (50 MB).
    pub const MAX_SIZE_BYTES: u64 = 50 * 1024 * 1024;
    /// Maximum number of cache entries.
    pub const MAX_ENTRIES: usize = 500;
    /// Eviction triggers at this fraction of a maximum.
    pub const TRIGGER_THRESHOLD: f64 = 0.8;
    /// Eviction removes entries until usage is back down to this fraction.
    pub const TARGET_FRACTION: f64 = 0.6;

    /// Score boost for stale entries. Dominates any realistic
    /// days-since-access value, so staleness outranks recency.
    pub const STALE_BOOST: f64 = 1_000.0;
    /// Score penalty for entries with a refresh in flight. Large enough to
    /// keep them out of normal eviction rounds, but finite, so extreme
    /// pressure can still reclaim them.
    pub const REVALIDATING_PENALTY: f64 = 10_000.0;

    /// Select the TTL class for a chunk of `range` cached at `now`.
    pub fn ttl_for(activity: RepoActivity, range: &DateRange, now: DateTime<Utc>) -> Duration {
        let old_cutoff = now - chrono::Duration::days(Self::OLD_WINDOW_AGE_DAYS);
        if range.end < old_cutoff {
            return Self::OLD_WINDOW_TTL;
        }
        match activity {
            RepoActivity::Active => Self::ACTIVE_REPO_TTL,
            RepoActivity::Archived => Self::ARCHIVED_REPO_TTL,
        }
    }
}

/// Chunked historical loader tuning.
pub struct LoaderConfig;

impl LoaderConfig {
    /// Width of one chunk in days. The last chunk of a range may be shorter.
    pub const CHUNK_DAYS: i64 = 90;
    /// Query the upstream rate-limit budget every this many chunks.
    pub const RATE_CHECK_INTERVAL: usize = 2;
    /// Stop loading when the remaining budget fraction drops below this.
    pub const MIN_BUDGET_FRACTION: f64 = 0.10;
}

/// Upstream data source configuration.
pub struct SourceConfig;

impl SourceConfig {
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const PER_PAGE: u32 = 100;
    /// Hard cap on pages fetched for a single chunk.
    pub const MAX_PAGES: u32 = 10;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = "RepoPulse/0.3";
}

/// Activity class of a repository, as tagged by the dashboard layer.
///
/// Selects which TTL a freshly cached chunk receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoActivity {
    Active,
    Archived,
}

impl RepoActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoActivity::Active => "active",
            RepoActivity::Archived => "archived",
        }
    }
}

impl Default for RepoActivity {
    fn default() -> Self {
        RepoActivity::Active
    }
}

impl std::fmt::Display for RepoActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
