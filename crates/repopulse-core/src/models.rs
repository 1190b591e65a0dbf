//! Core value types: collaboration data kinds and date ranges.

use crate::error::{PulseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of collaboration data tracked per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    PullRequests,
    Deployments,
    Commits,
}

impl DataType {
    /// All known data types, in display order.
    pub const ALL: [DataType; 3] = [
        DataType::PullRequests,
        DataType::Deployments,
        DataType::Commits,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::PullRequests => "pull_requests",
            DataType::Deployments => "deployments",
            DataType::Commits => "commits",
        }
    }

    /// Parse a data type from its string form.
    ///
    /// An unrecognized name is a programmer error on the caller's side and
    /// fails the single operation, never the process.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "pull_requests" => Ok(DataType::PullRequests),
            "deployments" => Ok(DataType::Deployments),
            "commits" => Ok(DataType::Commits),
            other => Err(PulseError::UnknownDataType(other.to_string())),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A half-open time interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, validating `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(PulseError::validation(
                "date_range",
                format!("start {} must be before end {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// Number of days spanned, rounded up to whole days.
    pub fn days(&self) -> i64 {
        let secs = (self.end - self.start).num_seconds();
        (secs + 86_399) / 86_400
    }

    /// Whether `instant` falls inside this range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Split into contiguous chunks of at most `chunk_days` days.
    ///
    /// Chunks are returned earliest first, cover the range exactly with no
    /// gaps or overlaps, and the last chunk may be shorter. Produces
    /// `ceil(days / chunk_days)` chunks.
    pub fn split(&self, chunk_days: i64) -> Vec<DateRange> {
        let step = chrono::Duration::days(chunk_days.max(1));
        let mut chunks = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let chunk_end = (cursor + step).min(self.end);
            chunks.push(DateRange {
                start: cursor,
                end: chunk_end,
            });
            cursor = chunk_end;
        }
        chunks
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n as i64)
    }

    #[test]
    fn test_data_type_roundtrip() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_str(dt.as_str()).unwrap(), dt);
        }
    }

    #[test]
    fn test_data_type_unknown() {
        let err = DataType::from_str("releases").unwrap_err();
        assert!(matches!(err, PulseError::UnknownDataType(ref s) if s == "releases"));
    }

    #[test]
    fn test_range_rejects_inverted() {
        assert!(DateRange::new(day(10), day(10)).is_err());
        assert!(DateRange::new(day(10), day(5)).is_err());
    }

    #[test]
    fn test_split_exact_cover() {
        let range = DateRange::new(day(0), day(200)).unwrap();
        let chunks = range.split(90);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].days(), 90);
        assert_eq!(chunks[1].days(), 90);
        assert_eq!(chunks[2].days(), 20);

        // No gaps, no overlaps, full cover.
        assert_eq!(chunks[0].start, range.start);
        assert_eq!(chunks[2].end, range.end);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_split_single_chunk() {
        let range = DateRange::new(day(0), day(31)).unwrap();
        let chunks = range.split(90);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], range);
    }

    #[test]
    fn test_split_exact_multiple() {
        let range = DateRange::new(day(0), day(180)).unwrap();
        assert_eq!(range.split(90).len(), 2);
    }

    #[test]
    fn test_days_rounds_up() {
        let start = day(0);
        let end = start + chrono::Duration::hours(25);
        let range = DateRange::new(start, end).unwrap();
        assert_eq!(range.days(), 2);
    }

    #[test]
    fn test_contains_half_open() {
        let range = DateRange::new(day(0), day(10)).unwrap();
        assert!(range.contains(day(0)));
        assert!(range.contains(day(9)));
        assert!(!range.contains(day(10)));
    }
}
