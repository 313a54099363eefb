//! Job and subtask records with their one-way state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::feed::Feed;

/// Lifecycle state of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states are never overwritten.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed | JobState::Cancelled)
    }

    /// State-machine guard: pending → running → terminal, one-way.
    ///
    /// `Success` is only reachable from `Running`, so a late finalize signal
    /// can never overwrite a cancellation or failure recorded elsewhere.
    pub fn can_transition(&self, to: JobState) -> bool {
        match (self, to) {
            (JobState::Pending, JobState::Running) => true,
            (JobState::Running, JobState::Success) => true,
            (JobState::Pending | JobState::Running, JobState::Failed) => true,
            (JobState::Pending | JobState::Running, JobState::Cancelled) => true,
            _ => false,
        }
    }
}

/// One execution of the ingestion pipeline for a feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub state: JobState,

    /// Lower bound of the history window this run asked for
    pub earliest_item_requested: DateTime<Utc>,

    /// Upper bound of the history window (time of submission)
    pub latest_item_requested: DateTime<Utc>,

    pub run_datetime: DateTime<Utc>,

    /// Accept posts whose domain differs from the feed's domain
    pub include_remote_blogs: bool,

    /// Free-text diagnostic surfaced to the caller on failure
    pub info: Option<String>,
}

impl Job {
    /// Create a pending job for a feed. The requested window starts at the
    /// feed's freshness watermark, or the configured default epoch for a
    /// feed that has never been ingested.
    pub fn new(feed: &Feed, include_remote_blogs: bool, default_earliest: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            feed_id: feed.id,
            state: JobState::Pending,
            earliest_item_requested: feed.latest_item_pubdate.unwrap_or(default_earliest),
            latest_item_requested: now,
            run_datetime: now,
            include_remote_blogs,
            info: None,
        }
    }
}

/// Terminal-or-in-flight status of one unit of work within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// In flight; every record starts here
    Retrieving,
    Retrieved,
    Skipped,
    Failed,
    Cancelled,
    TimedOut,
}

impl SubtaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubtaskStatus::Retrieving)
    }
}

/// Audit record of one discovery/extraction attempt within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskRecord {
    pub id: Uuid,
    pub job_id: Uuid,

    /// The post this record concerns; absent for URL-level records
    pub post_id: Option<Uuid>,

    /// Discovered URL or post link this attempt worked on
    pub link: String,

    pub status: SubtaskStatus,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubtaskRecord {
    /// New in-flight record.
    pub fn new(job_id: Uuid, link: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            post_id: None,
            link: link.into(),
            status: SubtaskStatus::Retrieving,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the post this record concerns.
    pub fn with_post(mut self, post_id: Uuid) -> Self {
        self.post_id = Some(post_id);
        self
    }

    /// New record created directly in a terminal status (skips, failures
    /// observed before any work started).
    pub fn terminal(
        job_id: Uuid,
        link: impl Into<String>,
        status: SubtaskStatus,
        error: Option<&str>,
    ) -> Self {
        let mut record = Self::new(job_id, link);
        record.status = status;
        record.error = error.map(str::to_string);
        record
    }
}

/// A job's subtask records bucketed by status, for progress reporting.
#[derive(Debug, Default, Clone, Serialize)]
pub struct JobProgress {
    pub retrieving: Vec<SubtaskRecord>,
    pub retrieved: Vec<SubtaskRecord>,
    pub skipped: Vec<SubtaskRecord>,
    pub failed: Vec<SubtaskRecord>,
    pub cancelled: Vec<SubtaskRecord>,
    pub timed_out: Vec<SubtaskRecord>,
}

impl JobProgress {
    pub fn from_records(records: Vec<SubtaskRecord>) -> Self {
        let mut progress = Self::default();
        for record in records {
            match record.status {
                SubtaskStatus::Retrieving => progress.retrieving.push(record),
                SubtaskStatus::Retrieved => progress.retrieved.push(record),
                SubtaskStatus::Skipped => progress.skipped.push(record),
                SubtaskStatus::Failed => progress.failed.push(record),
                SubtaskStatus::Cancelled => progress.cancelled.push(record),
                SubtaskStatus::TimedOut => progress.timed_out.push(record),
            }
        }
        progress
    }

    pub fn total(&self) -> usize {
        self.retrieving.len()
            + self.retrieved.len()
            + self.skipped.len()
            + self.failed.len()
            + self.cancelled.len()
            + self.timed_out.len()
    }
}
