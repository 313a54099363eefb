//! Persistence traits for feeds, posts, and jobs.
//!
//! The storage layer is split into focused traits:
//! - `FeedStore`: feed records and their pubdate aggregates
//! - `PostStore`: posts and categories with the (feed, link) invariant
//! - `JobStore`: jobs, subtask records, and the guarded state machine
//! - `IngestStore`: composite trait combining all three

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Category, Feed, FeedType, Job, JobState, Post, SubtaskRecord, SubtaskStatus};

/// Store for feed records.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Get a feed by id.
    async fn get_feed(&self, id: Uuid) -> Result<Option<Feed>>;

    /// Insert or replace a feed. Implementations must preserve the
    /// url → id invariant (the id is a pure function of the url).
    async fn upsert_feed(&self, feed: &Feed) -> Result<()>;

    /// Write parse-derived metadata back onto a feed.
    async fn update_feed_metadata(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
        feed_type: FeedType,
    ) -> Result<()>;

    /// Fold a newly accepted post's publish date into the feed's
    /// earliest/latest aggregate. Must be atomic per call; the fold is
    /// commutative so call order does not matter.
    async fn fold_feed_pubdate(&self, id: Uuid, pubdate: DateTime<Utc>) -> Result<()>;
}

/// Store for posts and categories.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Get a post by (feed, link), including manually deleted tombstones.
    async fn get_post_by_link(&self, feed_id: Uuid, link: &str) -> Result<Option<Post>>;

    /// Create the post if no post with its (feed, link) exists; otherwise
    /// return the existing record untouched (first write wins, tombstones
    /// included). Returns the stored post and whether it was created.
    async fn get_or_create_post(&self, post: Post) -> Result<(Post, bool)>;

    /// Replace a post's body after full-text extraction.
    async fn update_post_content(
        &self,
        id: Uuid,
        description: &str,
        content_type: &str,
        is_full_text: bool,
    ) -> Result<()>;

    /// Get or create a category by case-sensitive name.
    async fn get_or_create_category(&self, name: &str) -> Result<Category>;

    /// Attach categories to a post, creating unseen names.
    async fn add_post_categories(&self, post_id: Uuid, names: &[String]) -> Result<()>;

    /// All posts of a feed (tombstones included).
    async fn posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>>;

    /// Get a post by id.
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>>;
}

/// Store for jobs and their subtask records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Get a job by id.
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    /// Atomic read of a job's current state; this is the cooperative
    /// cancellation probe, so it must not serve a stale cache.
    async fn job_state(&self, id: Uuid) -> Result<Option<JobState>>;

    /// Attempt a guarded state transition (see [`JobState::can_transition`])
    /// and return the state the job holds afterwards. A rejected transition
    /// is not an error; the caller inspects the returned state.
    async fn transition_job(&self, id: Uuid, to: JobState, info: Option<&str>)
        -> Result<JobState>;

    /// All jobs currently in any of the given states.
    async fn jobs_in_states(&self, states: &[JobState]) -> Result<Vec<Job>>;

    /// Persist a new subtask record.
    async fn create_subtask(&self, record: &SubtaskRecord) -> Result<()>;

    /// Move a subtask record to a terminal status. One-way: a record
    /// already terminal is left untouched.
    async fn finish_subtask(
        &self,
        id: Uuid,
        status: SubtaskStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// All subtask records of a job.
    async fn subtasks_for_job(&self, job_id: Uuid) -> Result<Vec<SubtaskRecord>>;
}

/// Composite storage trait combining all three stores.
pub trait IngestStore: FeedStore + PostStore + JobStore {}

// Blanket implementation: anything implementing all three is an IngestStore
impl<T: FeedStore + PostStore + JobStore> IngestStore for T {}

/// Read-side probe a worker polls at loop entries and backoff boundaries
/// to detect cooperative cancellation.
#[async_trait]
pub trait CancelProbe: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// Probe that never reports cancellation, for fetches outside any job.
pub struct NeverCancelled;

#[async_trait]
impl CancelProbe for NeverCancelled {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

/// Probe backed by a job's persisted state.
pub struct JobCancelProbe<'a, S: JobStore + ?Sized> {
    store: &'a S,
    job_id: Uuid,
}

impl<'a, S: JobStore + ?Sized> JobCancelProbe<'a, S> {
    pub fn new(store: &'a S, job_id: Uuid) -> Self {
        Self { store, job_id }
    }
}

#[async_trait]
impl<S: JobStore + ?Sized> CancelProbe for JobCancelProbe<'_, S> {
    async fn is_cancelled(&self) -> bool {
        matches!(
            self.store.job_state(self.job_id).await,
            Ok(Some(JobState::Cancelled))
        )
    }
}
