//! SQLite-backed durable cache store.

use super::entry::CacheEntry;
use super::eviction;
use super::traits::{CacheStats, CacheStore, StoreLimits};
use crate::error::{PulseError, Result};
use crate::models::{DataType, DateRange};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Durable cache store backed by a single SQLite database.
///
/// Thread-safe via an internal mutex on the connection. Unlike a plain
/// key-value cache, expired rows are still returned by reads: staleness is
/// the consumer's decision, and a stale hit is a usable fallback.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    limits: StoreLimits,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_limits(db_path, StoreLimits::default())
    }

    /// Open a store with custom limits.
    pub fn with_limits(db_path: impl AsRef<Path>, limits: StoreLimits) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PulseError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| PulseError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL for concurrent readers across loader invocations.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PulseError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            limits,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                repository_id TEXT NOT NULL,
                data_type TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end TEXT NOT NULL,
                data TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                is_revalidating INTEGER NOT NULL DEFAULT 0
            );

            -- Per-repository clears and listings
            CREATE INDEX IF NOT EXISTS idx_entries_repository
                ON cache_entries(repository_id);

            -- LRU eviction scans
            CREATE INDEX IF NOT EXISTS idx_entries_accessed
                ON cache_entries(last_accessed_at);

            -- Staleness sweeps
            CREATE INDEX IF NOT EXISTS idx_entries_expires
                ON cache_entries(expires_at);
            "#,
        )
        .map_err(|e| PulseError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PulseError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Decode one row into an entry. A row that fails validation is a
    /// corrupt record and reads as a miss.
    fn decode_row(row: StoredRow) -> Option<CacheEntry> {
        let data = match serde_json::from_str(&row.data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Corrupt cache payload for {}: {}", row.key, e);
                return None;
            }
        };
        match CacheEntry::from_stored(
            row.key.clone(),
            row.repository_id,
            &row.data_type,
            &row.range_start,
            &row.range_end,
            data,
            &row.cached_at,
            &row.expires_at,
            &row.last_accessed_at,
            row.size_bytes as u64,
            row.is_revalidating != 0,
        ) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Corrupt cache record for {}: {}", row.key, e);
                None
            }
        }
    }

    fn insert_entry(conn: &Connection, entry: &CacheEntry) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (key, repository_id, data_type, range_start, range_end, data,
             cached_at, expires_at, last_accessed_at, size_bytes, is_revalidating)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                entry.key,
                entry.repository_id,
                entry.data_type.as_str(),
                entry.date_range.start.to_rfc3339(),
                entry.date_range.end.to_rfc3339(),
                serde_json::to_string(&entry.data)?,
                entry.cached_at.to_rfc3339(),
                entry.expires_at.to_rfc3339(),
                entry.last_accessed_at.to_rfc3339(),
                entry.size_bytes as i64,
                entry.is_revalidating as i64,
            ],
        )
        .map_err(map_write_error)?;
        Ok(())
    }

    fn select_all(conn: &Connection, filter_repository: Option<&str>) -> Result<Vec<CacheEntry>> {
        let (sql, filter) = match filter_repository {
            Some(repo) => (
                "SELECT key, repository_id, data_type, range_start, range_end, data,
                        cached_at, expires_at, last_accessed_at, size_bytes, is_revalidating
                 FROM cache_entries WHERE repository_id = ?1",
                Some(repo),
            ),
            None => (
                "SELECT key, repository_id, data_type, range_start, range_end, data,
                        cached_at, expires_at, last_accessed_at, size_bytes, is_revalidating
                 FROM cache_entries",
                None,
            ),
        };

        let mut stmt = conn.prepare(sql).map_err(|e| PulseError::Database {
            message: format!("Failed to prepare entry query: {}", e),
            source: Some(e),
        })?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredRow> {
            Ok(StoredRow {
                key: row.get(0)?,
                repository_id: row.get(1)?,
                data_type: row.get(2)?,
                range_start: row.get(3)?,
                range_end: row.get(4)?,
                data: row.get(5)?,
                cached_at: row.get(6)?,
                expires_at: row.get(7)?,
                last_accessed_at: row.get(8)?,
                size_bytes: row.get(9)?,
                is_revalidating: row.get(10)?,
            })
        };

        let rows = match filter {
            Some(repo) => stmt.query_map(params![repo], map_row),
            None => stmt.query_map([], map_row),
        }
        .map_err(|e| PulseError::Database {
            message: format!("Failed to query entries: {}", e),
            source: Some(e),
        })?;

        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(Self::decode_row)
            .collect())
    }

    /// Apply eviction pressure after a write. Failures are logged, not
    /// propagated: the write itself already succeeded.
    fn maybe_evict(&self) {
        let result = (|| -> Result<usize> {
            let entries = self.get_all()?;
            let keys = eviction::pressure_plan(&entries, &self.limits, Utc::now());
            if keys.is_empty() {
                return Ok(0);
            }
            self.evict(&keys)
        })();

        match result {
            Ok(0) => {}
            Ok(evicted) => debug!("Evicted {} cache entries under pressure", evicted),
            Err(e) => warn!("Cache eviction failed: {}", e),
        }
    }
}

struct StoredRow {
    key: String,
    repository_id: String,
    data_type: String,
    range_start: String,
    range_end: String,
    data: String,
    cached_at: String,
    expires_at: String,
    last_accessed_at: String,
    size_bytes: i64,
    is_revalidating: i64,
}

fn map_write_error(e: rusqlite::Error) -> PulseError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &e {
        if ffi_err.code == ErrorCode::DiskFull {
            return PulseError::StorageFull {
                message: e.to_string(),
            };
        }
    }
    PulseError::Database {
        message: format!("Failed to write cache entry: {}", e),
        source: Some(e),
    }
}

fn parse_stat_instant(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl CacheStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock_conn()?;

        let row: Option<StoredRow> = conn
            .query_row(
                "SELECT key, repository_id, data_type, range_start, range_end, data,
                        cached_at, expires_at, last_accessed_at, size_bytes, is_revalidating
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredRow {
                        key: row.get(0)?,
                        repository_id: row.get(1)?,
                        data_type: row.get(2)?,
                        range_start: row.get(3)?,
                        range_end: row.get(4)?,
                        data: row.get(5)?,
                        cached_at: row.get(6)?,
                        expires_at: row.get(7)?,
                        last_accessed_at: row.get(8)?,
                        size_bytes: row.get(9)?,
                        is_revalidating: row.get(10)?,
                    })
                },
            )
            .optional()
            .map_err(|e| PulseError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let entry = match row.and_then(Self::decode_row) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        // Persist the refreshed access time; best effort.
        let touched = entry.touch();
        let _ = conn.execute(
            "UPDATE cache_entries SET last_accessed_at = ?1 WHERE key = ?2",
            params![touched.last_accessed_at.to_rfc3339(), key],
        );

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
        {
            let conn = self.lock_conn()?;
            Self::insert_entry(&conn, &entry)?;
        }
        self.maybe_evict();
        Ok(())
    }

    fn set_many(&self, entries: Vec<CacheEntry>) -> Result<()> {
        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction().map_err(|e| PulseError::Database {
                message: format!("Failed to start transaction: {}", e),
                source: Some(e),
            })?;
            for entry in &entries {
                Self::insert_entry(&tx, entry)?;
            }
            tx.commit().map_err(|e| PulseError::Database {
                message: format!("Failed to commit batch: {}", e),
                source: Some(e),
            })?;
        }
        self.maybe_evict();
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.lock_conn()?;
        Self::select_all(&conn, None)
    }

    fn get_by_repository(&self, repository_id: &str) -> Result<Vec<CacheEntry>> {
        let conn = self.lock_conn()?;
        Self::select_all(&conn, Some(repository_id))
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock_conn()?;

        let (count, size, oldest, newest): (i64, i64, Option<String>, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0),
                        MIN(cached_at), MAX(cached_at)
                 FROM cache_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to query cache stats: {}", e),
                source: Some(e),
            })?;

        Ok(CacheStats {
            total_entries: count as usize,
            total_size_bytes: size as u64,
            oldest_entry: parse_stat_instant(oldest),
            newest_entry: parse_stat_instant(newest),
        })
    }

    fn evict(&self, keys: &[String]) -> Result<usize> {
        let conn = self.lock_conn()?;
        let mut removed = 0;
        for key in keys {
            removed += conn
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map_err(|e| PulseError::Database {
                    message: format!("Failed to evict cache entry: {}", e),
                    source: Some(e),
                })?;
        }
        Ok(removed)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| PulseError::Database {
                message: format!("Failed to delete cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn clear_repository(&self, repository_id: &str) -> Result<usize> {
        let conn = self.lock_conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE repository_id = ?1",
                params![repository_id],
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to clear repository cache: {}", e),
                source: Some(e),
            })?;
        debug!("Cleared {} cache entries for '{}'", deleted, repository_id);
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| PulseError::Database {
                message: format!("Failed to clear cache: {}", e),
                source: Some(e),
            })?;
        debug!("Cleared all cache entries");
        Ok(())
    }

    fn cleanup_stale(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1 AND is_revalidating = 0",
                params![now],
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to sweep stale entries: {}", e),
                source: Some(e),
            })?;
        if deleted > 0 {
            debug!("Swept {} stale cache entries", deleted);
        }
        Ok(deleted)
    }
}
