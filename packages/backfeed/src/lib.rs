//! Blog-history ingestion pipeline.
//!
//! Reconstructs a blog's full post archive from three kinds of source —
//! live RSS/Atom feeds, historical web-archive snapshots of the feed URL,
//! and (for sites with no feed at all) an external search index — then
//! extracts a readable full-text body per post. Every run is a [`Job`]
//! whose per-URL and per-post work is tracked as [`SubtaskRecord`]s the
//! caller can read back, bucketed by status.
//!
//! The CRUD/API layer, pagination, and the persistence engine live
//! outside this crate; they plug in through the traits in [`traits`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use backfeed::{Feed, FeedType, IngestConfig, MemoryStore, Orchestrator};
//! use backfeed::discovery::{SerperSearch, WaybackCdx};
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = IngestConfig::default();
//! let fetcher = Arc::new(backfeed::Fetcher::new(&config));
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::clone(&store),
//!     store.clone(),
//!     Arc::new(WaybackCdx::new(Arc::clone(&fetcher))),
//!     Arc::new(SerperSearch::new(api_key)),
//!     config,
//! );
//!
//! orchestrator.recover_interrupted_jobs().await?;
//!
//! let feed = Feed::new("https://example.com/rss.xml", FeedType::Rss);
//! store.upsert_feed(&feed).await?;
//! let job = orchestrator.start_ingest_job(feed.id, false).await?;
//! let progress = orchestrator.job_progress(job.id).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (stores, lock, archive, search)
//! - [`types`] - Domain types (Feed, Post, Job, SubtaskRecord, config)
//! - [`jobs`] - Orchestrator, feed lock, task queue, pipeline runner
//! - [`discovery`] - Archive-snapshot and search-index discovery
//! - [`feed`] - RSS/Atom detection and parsing
//! - [`fetch`] - HTTP retrieval with retry/backoff and proxy fallback
//! - [`extract`] - Reader-mode full-text extraction
//! - [`materialize`] - Deduplicating post materialization
//! - [`stores`] - In-memory reference store

pub mod discovery;
pub mod error;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod jobs;
pub mod materialize;
pub mod stores;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{FetchError, IngestError, Result};
pub use fetch::{FetchedPage, Fetcher};
pub use jobs::{FeedLock, Orchestrator, TaskQueue};
pub use stores::MemoryStore;
pub use traits::{
    archive::{ArchiveIndex, MockArchiveIndex, SnapshotRecord},
    lock::LockStore,
    search::{MockSearchIndex, SearchHit, SearchIndex, SearchPage},
    store::{CancelProbe, FeedStore, IngestStore, JobCancelProbe, JobStore, NeverCancelled, PostStore},
};
pub use types::{
    Category, Feed, FeedType, IngestConfig, Job, JobProgress, JobState, Post, PostCandidate,
    SubtaskRecord, SubtaskStatus, SERVICE_NAMESPACE,
};

// Re-export pipeline components
pub use discovery::{historical_urls, search_candidates, SerperSearch, WaybackCdx};
pub use extract::{extract_full_text, ExtractedContent};
pub use feed::{parse_feed, sniff_feed_type, AtomParser, FeedParser, ParsedDocument, ParsedFeed, RssParser};
pub use materialize::{materialize_candidates, MaterializeOutcome, MaterializedPost};
