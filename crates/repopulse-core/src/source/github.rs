//! GitHub REST implementation of the data source.
//!
//! Paginates the list endpoints for pull requests, deployments, and commits,
//! tracks the rate-limit budget from response headers, and answers budget
//! queries from the `/rate_limit` endpoint with a header-derived fallback
//! when that endpoint is unreachable.

use super::{DataSource, RateLimitStatus, SourceError, SourceErrorKind, SourceResult};
use crate::cancel::CancellationToken;
use crate::config::SourceConfig;
use crate::models::DateRange;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// GitHub-backed data source.
pub struct GitHubSource {
    client: Client,
    token: Option<String>,
    /// Rate limit state from the most recent response headers (-1 = unseen).
    rate_remaining: AtomicI64,
    rate_total: AtomicU64,
    rate_reset_epoch: AtomicU64,
}

impl GitHubSource {
    /// Create an unauthenticated source.
    pub fn new() -> SourceResult<Self> {
        Self::with_token(None)
    }

    /// Create a source, optionally authenticated with a bearer token.
    pub fn with_token(token: Option<String>) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(SourceConfig::REQUEST_TIMEOUT)
            .user_agent(SourceConfig::USER_AGENT)
            .build()
            .map_err(|e| {
                SourceError::new(
                    SourceErrorKind::Network,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            token,
            rate_remaining: AtomicI64::new(-1),
            rate_total: AtomicU64::new(0),
            rate_reset_epoch: AtomicU64::new(0),
        })
    }

    /// Rate-limit state assembled from response headers, if any response has
    /// been seen yet.
    pub fn header_rate_state(&self) -> Option<RateLimitStatus> {
        let remaining = self.rate_remaining.load(Ordering::SeqCst);
        let total = self.rate_total.load(Ordering::SeqCst);
        if remaining < 0 || total == 0 {
            return None;
        }
        let reset_at = DateTime::from_timestamp(
            self.rate_reset_epoch.load(Ordering::SeqCst) as i64,
            0,
        )
        .unwrap_or_else(Utc::now);
        Some(RateLimitStatus {
            remaining: remaining as u32,
            total: total as u32,
            reset_at,
        })
    }

    fn update_rate_state(&self, headers: &HeaderMap) {
        let header_u64 = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        if let Some(remaining) = header_u64("X-RateLimit-Remaining") {
            self.rate_remaining.store(remaining as i64, Ordering::SeqCst);
        }
        if let Some(total) = header_u64("X-RateLimit-Limit") {
            self.rate_total.store(total, Ordering::SeqCst);
        }
        if let Some(reset) = header_u64("X-RateLimit-Reset") {
            self.rate_reset_epoch.store(reset, Ordering::SeqCst);
        }

        let remaining = self.rate_remaining.load(Ordering::SeqCst);
        let total = self.rate_total.load(Ordering::SeqCst);
        if remaining >= 0 && total > 0 {
            debug!("GitHub rate limit: {}/{}", remaining, total);
        }
    }

    async fn get_json(&self, url: &str, cancel: &CancellationToken) -> SourceResult<Value> {
        cancel.check()?;

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        self.update_rate_state(response.headers());

        let response = self.check_status(response, url)?;
        response.json::<Value>().await.map_err(|e| {
            SourceError::new(
                SourceErrorKind::Unknown,
                format!("Failed to parse response from {}: {}", url, e),
            )
        })
    }

    fn check_status(&self, response: Response, url: &str) -> SourceResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let kind = match status {
            StatusCode::UNAUTHORIZED => SourceErrorKind::Auth,
            StatusCode::FORBIDDEN => {
                // GitHub signals primary rate-limit exhaustion with 403 and
                // a zeroed remaining header.
                if self.rate_remaining.load(Ordering::SeqCst) == 0 || retry_after.is_some() {
                    SourceErrorKind::RateLimited
                } else {
                    SourceErrorKind::Auth
                }
            }
            StatusCode::NOT_FOUND => SourceErrorKind::NotFound,
            StatusCode::UNPROCESSABLE_ENTITY => SourceErrorKind::InvalidRepository,
            StatusCode::TOO_MANY_REQUESTS => SourceErrorKind::RateLimited,
            s if s.is_server_error() => SourceErrorKind::Network,
            _ => SourceErrorKind::Unknown,
        };

        Err(
            SourceError::new(kind, format!("GET {} returned {}", url, status))
                .with_retry_after(retry_after),
        )
    }

    /// Fetch every page of one list endpoint.
    ///
    /// When `date_filter` is given, items are kept only if their field falls
    /// inside the range; pagination stops early once a page reaches items
    /// older than the range (list endpoints return newest first).
    async fn fetch_paged(
        &self,
        repository_id: &str,
        resource: &str,
        extra_query: &str,
        date_filter: Option<(&str, &DateRange)>,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        validate_repository(repository_id)?;

        let mut items = Vec::new();
        for page in 1..=SourceConfig::MAX_PAGES {
            let url = format!(
                "{}/repos/{}/{}?per_page={}&page={}{}",
                SourceConfig::GITHUB_API_BASE,
                repository_id,
                resource,
                SourceConfig::PER_PAGE,
                page,
                extra_query,
            );

            let body = self.get_json(&url, cancel).await?;
            let page_items = match body {
                Value::Array(list) => list,
                other => {
                    return Err(SourceError::new(
                        SourceErrorKind::Unknown,
                        format!("Expected array from {}, got {}", url, json_kind(&other)),
                    ))
                }
            };
            let page_len = page_items.len();

            let mut saw_older = false;
            match date_filter {
                Some((field, range)) => {
                    for item in page_items {
                        match item_instant(&item, field) {
                            Some(at) if range.contains(at) => items.push(item),
                            Some(at) if at < range.start => saw_older = true,
                            _ => {}
                        }
                    }
                }
                None => items.extend(page_items),
            }

            if saw_older || page_len < SourceConfig::PER_PAGE as usize {
                break;
            }
        }

        info!(
            "Fetched {} {} items for {}",
            items.len(),
            resource,
            repository_id
        );
        Ok(items)
    }
}

#[async_trait]
impl DataSource for GitHubSource {
    async fn fetch_pull_requests(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        self.fetch_paged(
            repository_id,
            "pulls",
            "&state=all&sort=created&direction=desc",
            Some(("created_at", range)),
            cancel,
        )
        .await
    }

    async fn fetch_deployments(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        self.fetch_paged(
            repository_id,
            "deployments",
            "",
            Some(("created_at", range)),
            cancel,
        )
        .await
    }

    async fn fetch_commits(
        &self,
        repository_id: &str,
        range: &DateRange,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<Value>> {
        // The commits endpoint filters server-side.
        let window = format!(
            "&since={}&until={}",
            range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        self.fetch_paged(repository_id, "commits", &window, None, cancel)
            .await
    }

    async fn rate_limit_status(&self) -> SourceResult<RateLimitStatus> {
        let url = format!("{}/rate_limit", SourceConfig::GITHUB_API_BASE);
        let cancel = CancellationToken::new();

        match self.get_json(&url, &cancel).await {
            Ok(body) => {
                let core = &body["resources"]["core"];
                let remaining = core["remaining"].as_u64();
                let total = core["limit"].as_u64();
                let reset = core["reset"].as_i64();
                match (remaining, total) {
                    (Some(remaining), Some(total)) => Ok(RateLimitStatus {
                        remaining: remaining as u32,
                        total: total as u32,
                        reset_at: reset
                            .and_then(|r| DateTime::from_timestamp(r, 0))
                            .unwrap_or_else(Utc::now),
                    }),
                    _ => Err(SourceError::new(
                        SourceErrorKind::Unknown,
                        "Malformed rate limit response",
                    )),
                }
            }
            Err(e) => {
                // Endpoint unreachable: answer from the last seen headers
                // rather than failing a side-channel query outright.
                if let Some(state) = self.header_rate_state() {
                    warn!("Rate limit endpoint failed ({}), using header state", e);
                    return Ok(state);
                }
                Err(e)
            }
        }
    }
}

fn validate_repository(repository_id: &str) -> SourceResult<()> {
    match repository_id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(SourceError::new(
            SourceErrorKind::InvalidRepository,
            format!("expected owner/name, got {repository_id:?}"),
        )),
    }
}

fn item_instant(item: &Value, field: &str) -> Option<DateTime<Utc>> {
    item.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
