//! Progressive cache for repository collaboration data.
//!
//! Entries are keyed by repository, data type, and date range, carry a TTL,
//! and are evicted under size or count pressure by an LRU policy extended
//! with a staleness boost. Two interchangeable stores exist:
//! - [`SqliteStore`] — durable, the primary backend
//! - [`MemoryStore`] — process-local fallback
//!
//! [`open_store`] probes for durable storage and picks the backend; the
//! rest of the crate only ever sees `Arc<dyn CacheStore>`.

pub mod entry;
pub mod eviction;
mod memory;
mod sqlite;
mod traits;

pub use entry::CacheEntry;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CacheStats, CacheStore, StoreLimits};

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Open the cache, preferring durable storage.
///
/// Tries to open a SQLite store at `db_path`; on failure falls back to the
/// in-memory store so caching still works for the session. Expired entries
/// left over from previous sessions are swept on open.
pub fn open_store(db_path: impl AsRef<Path>) -> Arc<dyn CacheStore> {
    match SqliteStore::new(&db_path) {
        Ok(store) => {
            match store.cleanup_stale() {
                Ok(0) => {}
                Ok(swept) => debug!("Swept {} expired entries at startup", swept),
                Err(e) => warn!("Startup stale sweep failed: {}", e),
            }
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Durable cache unavailable at {} ({}), falling back to in-memory cache",
                db_path.as_ref().display(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}
