//! Pipeline configuration.
//!
//! One immutable value constructed at process start and passed by reference
//! into the fetcher, discovery, and orchestrator. Reconfiguring means
//! building a new value and swapping it, never mutating one mid-operation.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Retries after the first attempt of a fetch. Default: 3.
    pub request_retry_count: u32,

    /// Sleep before the first retry; grows by `backoff_multiplier` per
    /// attempt. Default: 20 s (archive indexes rate-limit aggressively).
    pub base_backoff: Duration,

    /// Multiplicative backoff factor. Default: 1.5.
    pub backoff_multiplier: f64,

    /// Per-request timeout. Default: 30 s.
    pub fetch_timeout: Duration,

    /// Window start for a feed that has never been ingested.
    /// Default: 2020-01-01T00:00:00Z.
    pub default_earliest: DateTime<Utc>,

    /// Advisory feed-lock TTL. Default: 1 h.
    pub lock_ttl: Duration,

    /// Delay between join polls. Default: 10 s.
    pub join_poll_interval: Duration,

    /// Join polls before the fan-out is declared timed out.
    /// Default: 1080 (≈ 3 h at the default interval).
    pub join_max_polls: u32,

    /// Length of one search-index discovery window, in days. Default: 100.
    pub search_window_days: i64,

    /// Results per search-index page. Default: 100.
    pub search_page_size: usize,

    /// Anti-bot proxy credential; fetches route through the proxy service
    /// when set.
    pub proxy_api_key: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            request_retry_count: 3,
            base_backoff: Duration::from_secs(20),
            backoff_multiplier: 1.5,
            fetch_timeout: Duration::from_secs(30),
            default_earliest: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            lock_ttl: Duration::from_secs(60 * 60),
            join_poll_interval: Duration::from_secs(10),
            join_max_polls: 1080,
            search_window_days: 100,
            search_page_size: 100,
            proxy_api_key: None,
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry count.
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.request_retry_count = retries;
        self
    }

    /// Set the base backoff sleep.
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Set the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the join poll cadence and bound.
    pub fn with_join_policy(mut self, interval: Duration, max_polls: u32) -> Self {
        self.join_poll_interval = interval;
        self.join_max_polls = max_polls;
        self
    }

    /// Set the default earliest search date.
    pub fn with_default_earliest(mut self, earliest: DateTime<Utc>) -> Self {
        self.default_earliest = earliest;
        self
    }

    /// Route fetches through the anti-bot proxy.
    pub fn with_proxy_api_key(mut self, key: impl Into<String>) -> Self {
        self.proxy_api_key = Some(key.into());
        self
    }

    /// Backoff before retry attempt `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.base_backoff.mul_f64(factor)
    }
}
