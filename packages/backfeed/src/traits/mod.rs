//! Core trait abstractions for the ingestion pipeline.
//!
//! These traits define the seams where external collaborators plug in:
//! persistence, the advisory lock store, the archive index, and the
//! search index.

pub mod archive;
pub mod lock;
pub mod search;
pub mod store;

pub use archive::{ArchiveIndex, MockArchiveIndex, SnapshotRecord};
pub use lock::LockStore;
pub use search::{MockSearchIndex, SearchHit, SearchIndex, SearchPage};
pub use store::{
    CancelProbe, FeedStore, IngestStore, JobCancelProbe, JobStore, NeverCancelled, PostStore,
};
