//! Upstream data source abstraction.
//!
//! The loader consumes collaboration data one date-range chunk at a time
//! through [`DataSource`], and checks the remaining request budget through
//! [`DataSource::rate_limit_status`]. [`GitHubSource`] is the production
//! implementation; tests script their own.

mod github;

pub use github::GitHubSource;

use crate::cancel::CancellationToken;
use crate::models::DateRange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for data source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    RateLimited,
    Network,
    Auth,
    NotFound,
    InvalidRepository,
    Timeout,
    Aborted,
    Unknown,
}

impl SourceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceErrorKind::RateLimited => "rate_limited",
            SourceErrorKind::Network => "network",
            SourceErrorKind::Auth => "auth",
            SourceErrorKind::NotFound => "not_found",
            SourceErrorKind::InvalidRepository => "invalid_repository",
            SourceErrorKind::Timeout => "timeout",
            SourceErrorKind::Aborted => "aborted",
            SourceErrorKind::Unknown => "unknown",
        }
    }
}

/// A typed upstream failure.
#[derive(Debug, Clone, Error)]
#[error("{} error: {message}", kind.as_str())]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
    /// Server-suggested wait before trying again, when it sent one.
    pub retry_after: Option<Duration>,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether a later identical request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::RateLimited | SourceErrorKind::Network | SourceErrorKind::Timeout
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            SourceErrorKind::Timeout
        } else {
            SourceErrorKind::Network
        };
        SourceError::new(kind, err.to_string())
    }
}

impl From<crate::cancel::CancelledError> for SourceError {
    fn from(_: crate::cancel::CancelledError) -> Self {
        SourceError::new(SourceErrorKind::Aborted, "fetch cancelled")
    }
}

/// Remaining upstream request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub total: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    /// Fraction of the budget still available, in `[0, 1]`.
    pub fn remaining_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.remaining as f64 / self.total as f64
    }
}

/// One-page-at-a-time access to the upstream repository-hosting API.
///
/// Each fetch covers a single date-range chunk of one data type. The
/// cancellation token is polled between pages; an in-flight HTTP request is
/// not interrupted.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_pull_requests(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<serde_json::Value>>;

    async fn fetch_deployments(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<serde_json::Value>>;

    async fn fetch_commits(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<serde_json::Value>>;

    /// Current request budget. Callers that cannot obtain it should degrade
    /// gracefully; this is a side-channel, not a load-bearing dependency.
    async fn rate_limit_status(&self) -> SourceResult<RateLimitStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::new(SourceErrorKind::RateLimited, "secondary limit hit");
        assert_eq!(err.to_string(), "rate_limited error: secondary limit hit");
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::new(SourceErrorKind::Network, "reset").is_transient());
        assert!(SourceError::new(SourceErrorKind::Timeout, "slow").is_transient());
        assert!(!SourceError::new(SourceErrorKind::NotFound, "gone").is_transient());
        assert!(!SourceError::new(SourceErrorKind::Auth, "denied").is_transient());
    }

    #[test]
    fn test_remaining_fraction() {
        let status = RateLimitStatus {
            remaining: 5,
            total: 100,
            reset_at: Utc::now(),
        };
        assert!((status.remaining_fraction() - 0.05).abs() < f64::EPSILON);

        let empty = RateLimitStatus {
            remaining: 10,
            total: 0,
            reset_at: Utc::now(),
        };
        assert_eq!(empty.remaining_fraction(), 0.0);
    }
}
