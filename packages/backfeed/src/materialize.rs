//! Deduplicating post materialization.
//!
//! Turns parser/discovery candidates into stored posts, in order, for one
//! unit of work: cancellation aborts the whole remaining batch, candidates
//! outside the feed's domain are recorded as skipped, and an existing
//! (feed, link) — including a manually deleted tombstone — is never
//! overwritten or re-extracted. Only genuinely new posts come back for
//! extraction scheduling.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::traits::store::IngestStore;
use crate::types::{Feed, Job, JobState, Post, PostCandidate, SubtaskRecord, SubtaskStatus};

/// A newly created post together with its in-flight subtask record.
#[derive(Debug, Clone)]
pub struct MaterializedPost {
    pub post: Post,
    pub subtask_id: Uuid,
}

/// Counters and the extraction work list for one materialization batch.
#[derive(Debug, Default)]
pub struct MaterializeOutcome {
    /// Genuinely new posts, in candidate order
    pub new_posts: Vec<MaterializedPost>,

    /// Candidates skipped by the domain-scope rule
    pub skipped: usize,

    /// Candidates whose (feed, link) already existed
    pub already_indexed: usize,
}

/// Materialize a batch of candidates for `job`.
///
/// Returns [`IngestError::Cancelled`] as soon as the job's persisted state
/// reads cancelled; work committed before that point stays committed.
pub async fn materialize_candidates<S>(
    store: &S,
    job: &Job,
    feed: &Feed,
    candidates: impl IntoIterator<Item = PostCandidate>,
) -> Result<MaterializeOutcome>
where
    S: IngestStore + ?Sized,
{
    let mut outcome = MaterializeOutcome::default();
    let feed_domain = feed.domain();

    for candidate in candidates {
        if matches!(
            store.job_state(job.id).await?,
            Some(JobState::Cancelled)
        ) {
            return Err(IngestError::Cancelled);
        }

        if !job.include_remote_blogs && candidate.domain() != feed_domain {
            debug!(link = %candidate.link, "skipping remote-domain candidate");
            let record = SubtaskRecord::terminal(
                job.id,
                &candidate.link,
                SubtaskStatus::Skipped,
                Some("post domain does not match feed domain"),
            );
            store.create_subtask(&record).await?;
            outcome.skipped += 1;
            continue;
        }

        let (post, created) = store
            .get_or_create_post(Post::from_candidate(feed.id, &candidate))
            .await?;
        if !created {
            // already indexed, or a tombstone the caller deleted; first
            // write wins either way and no extraction is scheduled
            outcome.already_indexed += 1;
            continue;
        }

        if !candidate.categories.is_empty() {
            store
                .add_post_categories(post.id, &candidate.categories)
                .await?;
        }
        store.fold_feed_pubdate(feed.id, post.pubdate).await?;

        let record = SubtaskRecord::new(job.id, &post.link).with_post(post.id);
        store.create_subtask(&record).await?;

        outcome.new_posts.push(MaterializedPost {
            post,
            subtask_id: record.id,
        });
    }

    info!(
        feed = %feed.url,
        new = outcome.new_posts.len(),
        skipped = outcome.skipped,
        existing = outcome.already_indexed,
        "materialized candidate batch"
    );
    Ok(outcome)
}
