//! Immutable cache entry for one chunk of collaboration data.
//!
//! An entry is a value object: every state transition (`touch`,
//! `start_revalidation`, `finish_revalidation`) returns a new entry and
//! leaves the receiver untouched, so concurrent readers holding the old
//! value never observe a partial update.

use crate::error::{PulseError, Result};
use crate::models::{DataType, DateRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Separator used inside cache keys. Must not occur in repository ids,
/// data-type names, or RFC-3339 timestamps.
const KEY_SEPARATOR: char = '|';

/// One cached segment of upstream data for a repository, data type, and
/// date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Composite key, reconstructible via [`CacheEntry::build_key`].
    pub key: String,
    /// Repository in "owner/name" form.
    pub repository_id: String,
    pub data_type: DataType,
    pub date_range: DateRange,
    /// Opaque payload; the loader stores chunk items as a JSON array.
    pub data: serde_json::Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Serialized payload size; always positive.
    pub size_bytes: u64,
    /// True while a background refresh is in flight.
    pub is_revalidating: bool,
}

impl CacheEntry {
    /// Create a fresh entry for newly fetched data.
    ///
    /// Validates the repository id, the TTL, and that the payload
    /// serializes to a non-empty byte sequence.
    pub fn new(
        repository_id: impl Into<String>,
        data_type: DataType,
        date_range: DateRange,
        data: serde_json::Value,
        ttl: Duration,
    ) -> Result<Self> {
        let repository_id = repository_id.into();
        validate_repository_id(&repository_id)?;

        let ttl = validate_ttl(ttl)?;
        let size_bytes = payload_size(&data)?;

        let now = Utc::now();
        Ok(Self {
            key: Self::build_key(&repository_id, data_type, &date_range),
            repository_id,
            data_type,
            date_range,
            data,
            cached_at: now,
            expires_at: now + ttl,
            last_accessed_at: now,
            size_bytes,
            is_revalidating: false,
        })
    }

    /// Build the composite key for a repository, data type, and range.
    pub fn build_key(repository_id: &str, data_type: DataType, range: &DateRange) -> String {
        format!(
            "{repository_id}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            data_type.as_str(),
            range.start.to_rfc3339(),
            range.end.to_rfc3339(),
        )
    }

    /// Recover the (repository, data type, range) triple from a key.
    pub fn parse_key(key: &str) -> Result<(String, DataType, DateRange)> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        if parts.len() != 4 {
            return Err(PulseError::validation(
                "key",
                format!("expected 4 segments, got {}", parts.len()),
            ));
        }
        let repository_id = parts[0].to_string();
        validate_repository_id(&repository_id)?;
        let data_type = DataType::from_str(parts[1])?;
        let start = parse_instant("key.start", parts[2])?;
        let end = parse_instant("key.end", parts[3])?;
        Ok((repository_id, data_type, DateRange::new(start, end)?))
    }

    /// Reconstruct an entry from its stored field representation.
    ///
    /// Fails with a validation error on any unparseable timestamp, so a
    /// corrupt row is caught here rather than surfacing bad data.
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        key: String,
        repository_id: String,
        data_type: &str,
        range_start: &str,
        range_end: &str,
        data: serde_json::Value,
        cached_at: &str,
        expires_at: &str,
        last_accessed_at: &str,
        size_bytes: u64,
        is_revalidating: bool,
    ) -> Result<Self> {
        let data_type = DataType::from_str(data_type)?;
        let date_range = DateRange::new(
            parse_instant("range_start", range_start)?,
            parse_instant("range_end", range_end)?,
        )?;
        if size_bytes == 0 {
            return Err(PulseError::validation("size_bytes", "must be positive"));
        }
        Ok(Self {
            key,
            repository_id,
            data_type,
            date_range,
            data,
            cached_at: parse_instant("cached_at", cached_at)?,
            expires_at: parse_instant("expires_at", expires_at)?,
            last_accessed_at: parse_instant("last_accessed_at", last_accessed_at)?,
            size_bytes,
            is_revalidating,
        })
    }

    /// Whether the entry has passed its expiry. Pure function of wall-clock
    /// time; reading an entry never changes its staleness.
    pub fn is_stale(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Staleness against an explicit clock, for policy code and tests.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Return a copy with `last_accessed_at` refreshed.
    ///
    /// The access time never moves backwards, even across clock skew.
    pub fn touch(&self) -> Self {
        let mut touched = self.clone();
        touched.last_accessed_at = Utc::now().max(self.last_accessed_at);
        touched
    }

    /// Return a copy marked as having a background refresh in flight.
    pub fn start_revalidation(&self) -> Self {
        let mut entry = self.clone();
        entry.is_revalidating = true;
        entry
    }

    /// Return a copy with the refreshed payload installed and the
    /// revalidation flag cleared.
    pub fn finish_revalidation(&self, new_data: serde_json::Value, new_ttl: Duration) -> Result<Self> {
        let ttl = validate_ttl(new_ttl)?;
        let size_bytes = payload_size(&new_data)?;

        let now = Utc::now();
        let mut entry = self.clone();
        entry.data = new_data;
        entry.cached_at = now;
        entry.expires_at = now + ttl;
        entry.size_bytes = size_bytes;
        entry.is_revalidating = false;
        Ok(entry)
    }
}

fn validate_repository_id(repository_id: &str) -> Result<()> {
    match repository_id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
        _ => {
            return Err(PulseError::validation(
                "repository_id",
                format!("expected owner/name, got {repository_id:?}"),
            ))
        }
    }
    if repository_id.contains(KEY_SEPARATOR) {
        return Err(PulseError::validation(
            "repository_id",
            format!("must not contain {KEY_SEPARATOR:?}"),
        ));
    }
    Ok(())
}

fn validate_ttl(ttl: Duration) -> Result<chrono::Duration> {
    if ttl.is_zero() {
        return Err(PulseError::validation("ttl", "must be positive"));
    }
    chrono::Duration::from_std(ttl)
        .map_err(|_| PulseError::validation("ttl", "out of range"))
}

fn payload_size(data: &serde_json::Value) -> Result<u64> {
    let bytes = serde_json::to_vec(data)?;
    if bytes.is_empty() {
        return Err(PulseError::validation("data", "serialized to zero bytes"));
    }
    Ok(bytes.len() as u64)
}

fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PulseError::validation(field, format!("unparseable timestamp {raw:?}: {e}")))
}
