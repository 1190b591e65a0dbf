//! RepoPulse data core - progressive cache and chunked historical loader.
//!
//! This crate provides the data layer behind the RepoPulse collaboration
//! dashboard: a local persistent cache for repository activity (pull
//! requests, deployments, commits) keyed by repository, data type, and date
//! range, and a background loader that walks wide historical ranges in
//! 90-day chunks while respecting the upstream rate-limit budget.
//!
//! # Example
//!
//! ```rust,ignore
//! use repopulse_core::{cache, ChunkedHistoricalLoader, DataType, DateRange, GitHubSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> repopulse_core::Result<()> {
//!     let store = cache::open_store("./repopulse-cache.sqlite");
//!     let source = Arc::new(GitHubSource::new().expect("http client"));
//!     let loader = ChunkedHistoricalLoader::new(store, source);
//!
//!     let now = chrono::Utc::now();
//!     let range = DateRange::new(now - chrono::Duration::days(365), now)?;
//!     let result = loader
//!         .load_historical("octo/dashboard", DataType::Commits, range, None, None)
//!         .await?;
//!     println!("{} items ({:?})", result.items.len(), result.status);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod source;

// Re-export commonly used types
pub use cache::{open_store, CacheEntry, CacheStats, CacheStore, MemoryStore, SqliteStore, StoreLimits};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{EvictionConfig, LoaderConfig, RepoActivity, SourceConfig};
pub use error::{PulseError, Result};
pub use loader::{ChunkedHistoricalLoader, HistoricalLoad, LoadProgress, LoadStatus};
pub use models::{DataType, DateRange};
pub use source::{
    DataSource, GitHubSource, RateLimitStatus, SourceError, SourceErrorKind, SourceResult,
};
