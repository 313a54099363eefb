//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. The split mirrors the two
//! failure domains: transport-level fetching and pipeline-level ingestion.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while fetching a single URL.
///
/// The variants encode the retry policy: [`FetchError::Fatal`] aborts a
/// retry loop immediately, everything else except [`FetchError::Cancelled`]
/// is eligible for backoff-and-retry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream (proxy-reported) server error; retrying will not help
    #[error("fatal upstream error for `{url}` (status {status})")]
    Fatal { url: String, status: u16 },

    /// The proxied fetch was redirected and needs another attempt
    #[error("fetch redirected for `{url}` (status {status})")]
    Redirected { url: String, status: u16 },

    /// Non-success HTTP status on a direct or proxied fetch
    #[error("request failed for `{url}`, status {status}")]
    Status { url: String, status: u16 },

    /// Network-level error (DNS, connection, TLS, timeout)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The proxy endpoint itself rejected the request
    #[error("proxy request failed (status {status}): {reason}")]
    Proxy { status: u16, reason: String },

    /// All retries were consumed; wraps the last underlying cause
    #[error("could not fetch `{url}` after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    /// The owning job was cancelled while this fetch was backing off
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Fatal errors abort a retry loop without consuming retries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Fatal { .. })
    }

    /// Whether a retry loop may attempt this fetch again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::Fatal { .. } | FetchError::Cancelled | FetchError::RetriesExhausted { .. }
        )
    }
}

/// Errors that can occur during ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fetch failed after retries (or fatally)
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Content is neither a supported RSS nor Atom document
    #[error("feed at `{url}` is neither RSS nor Atom")]
    UnknownFeedType { url: String },

    /// Full-text extraction failed; wraps the transport or parser cause
    #[error("full-text extraction failed for `{link}`")]
    Extraction {
        link: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Search-index discovery failed (treated as fatal for the job)
    #[error("search index error: {0}")]
    Search(String),

    /// Archive-index response could not be understood (retryable)
    #[error("archive index error: {0}")]
    Archive(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No feed exists under the given id
    #[error("feed not found: {id}")]
    FeedNotFound { id: Uuid },

    /// No job exists under the given id
    #[error("job not found: {id}")]
    JobNotFound { id: Uuid },

    /// Another job already holds this feed's lock
    #[error("feed is busy: job {job_id} is still running")]
    FeedBusy { job_id: Uuid },

    /// Operation observed a cooperative cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// The join poll exhausted its retry budget before fan-out completed
    #[error("join timed out after {polls} polls")]
    JoinTimedOut { polls: u32 },
}

impl IngestError {
    /// Wrap an arbitrary error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        IngestError::Storage(Box::new(err))
    }

    /// Errors that short-circuit discovery to an empty result instead of
    /// propagating (archive-index path only).
    pub fn is_fatal_fetch(&self) -> bool {
        matches!(self, IngestError::Fetch(f) if f.is_fatal())
    }
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
