//! The pipeline stages a job runs through.
//!
//! Stage order: discover → fetch/parse per URL (fan-out) → materialize →
//! extract per new post (fan-out) → join → finalize. Per-URL failures are
//! recorded and never abort sibling URLs; an error escaping the whole
//! chain lands in [`finalize`], which marks the job failed and always
//! releases the feed lock.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::discovery;
use crate::error::{FetchError, IngestError, Result};
use crate::extract;
use crate::fetch::Fetcher;
use crate::jobs::lock::FeedLock;
use crate::jobs::queue::{HandleSet, TaskQueue};
use crate::materialize::{materialize_candidates, MaterializedPost};
use crate::traits::archive::ArchiveIndex;
use crate::traits::search::SearchIndex;
use crate::traits::store::{CancelProbe, IngestStore, JobCancelProbe};
use crate::types::{Feed, FeedType, IngestConfig, Job, JobState, Post, SubtaskRecord, SubtaskStatus};

/// Everything a pipeline stage needs, cheap to clone into spawned units.
pub(crate) struct PipelineContext<S, A, I> {
    pub store: Arc<S>,
    pub lock: FeedLock,
    pub archive: Arc<A>,
    pub search: Arc<I>,
    pub fetcher: Arc<Fetcher>,
    pub queue: TaskQueue,
    pub config: Arc<IngestConfig>,
}

impl<S, A, I> Clone for PipelineContext<S, A, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            archive: Arc::clone(&self.archive),
            search: Arc::clone(&self.search),
            fetcher: Arc::clone(&self.fetcher),
            queue: self.queue.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

/// Entry point for an ingest job. The feed lock is already held.
pub(crate) async fn run_ingest<S, A, I>(ctx: PipelineContext<S, A, I>, job: Job, feed: Feed)
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    // a job cancelled while still queued does no work; just hand the
    // lock back
    match ctx.store.job_state(job.id).await {
        Ok(Some(JobState::Pending)) => {}
        _ => {
            let _ = ctx.lock.release(feed.id).await;
            return;
        }
    }
    let _ = ctx
        .store
        .transition_job(job.id, JobState::Running, None)
        .await;

    let result = ingest_pipeline(&ctx, &job, &feed).await;
    finalize(&ctx, &job, &feed, result).await;
}

/// Entry point for a patch job. Acquires the lock itself, with bounded
/// backoff, because the job was already accepted and must eventually run.
pub(crate) async fn run_patch<S, A, I>(
    ctx: PipelineContext<S, A, I>,
    job: Job,
    feed: Feed,
    posts: Vec<Post>,
)
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    // pre-flight: cancelled while queued → abort before touching the lock
    match ctx.store.job_state(job.id).await {
        Ok(Some(JobState::Pending)) => {}
        _ => return,
    }

    let acquired = match ctx
        .lock
        .acquire_with_retry(
            feed.id,
            job.id,
            ctx.config.request_retry_count,
            ctx.config.base_backoff,
            ctx.config.backoff_multiplier,
        )
        .await
    {
        Ok(acquired) => acquired,
        Err(err) => {
            let _ = ctx
                .store
                .transition_job(job.id, JobState::Failed, Some(&err.to_string()))
                .await;
            return;
        }
    };
    if !acquired {
        let _ = ctx
            .store
            .transition_job(
                job.id,
                JobState::Failed,
                Some("could not acquire feed lock"),
            )
            .await;
        return;
    }

    let _ = ctx
        .store
        .transition_job(job.id, JobState::Running, None)
        .await;

    let result = patch_pipeline(&ctx, &job, &posts).await;
    finalize(&ctx, &job, &feed, result).await;
}

async fn ingest_pipeline<S, A, I>(
    ctx: &PipelineContext<S, A, I>,
    job: &Job,
    feed: &Feed,
) -> Result<()>
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    let handles = HandleSet::new();

    match feed.feed_type {
        FeedType::Skeleton => {
            debug!(feed = %feed.url, "skeleton feed, nothing to discover");
        }
        FeedType::SearchIndex => {
            let site = feed.domain().ok_or_else(|| {
                IngestError::Search(format!("feed url `{}` has no host", feed.url))
            })?;
            let candidates = discovery::search_candidates(
                ctx.search.as_ref(),
                &site,
                job.earliest_item_requested,
                job.latest_item_requested,
                &ctx.config,
            )
            .await?;
            let outcome =
                materialize_candidates(ctx.store.as_ref(), job, feed, candidates.into_values())
                    .await?;
            schedule_extractions(ctx, job.id, outcome.new_posts, &handles);
        }
        FeedType::Rss | FeedType::Atom => {
            let urls = discovery::historical_urls(
                ctx.archive.as_ref(),
                &feed.url,
                job.earliest_item_requested,
                job.latest_item_requested,
                &ctx.config,
            )
            .await?;

            let probe = JobCancelProbe::new(ctx.store.as_ref(), job.id);
            if probe.is_cancelled().await {
                return Err(IngestError::Cancelled);
            }

            for url in urls {
                let task_ctx = ctx.clone();
                let task_job = job.clone();
                let task_feed = feed.clone();
                let task_handles = handles.clone();
                let handle = ctx.queue.submit(async move {
                    process_url(task_ctx, task_job, task_feed, url, task_handles).await;
                });
                handles.add(handle);
            }
        }
    }

    let joined = ctx
        .queue
        .join_with_retry(
            &handles,
            ctx.config.join_poll_interval,
            ctx.config.join_max_polls,
        )
        .await;

    if matches!(joined, Err(IngestError::JoinTimedOut { .. })) {
        mark_inflight_timed_out(ctx.store.as_ref(), job.id).await;
    }
    joined
}

/// One fanned-out unit: fetch a discovered URL, parse it, materialize its
/// candidates, and schedule extraction for the new posts. Failure is
/// recorded against this URL only.
async fn process_url<S, A, I>(
    ctx: PipelineContext<S, A, I>,
    job: Job,
    feed: Feed,
    url: String,
    handles: HandleSet,
)
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    let probe = JobCancelProbe::new(ctx.store.as_ref(), job.id);
    if probe.is_cancelled().await {
        let record = SubtaskRecord::terminal(job.id, &url, SubtaskStatus::Cancelled, None);
        let _ = ctx.store.create_subtask(&record).await;
        return;
    }

    match fetch_parse_materialize(&ctx, &job, &feed, &url, &handles).await {
        Ok(()) => {}
        Err(IngestError::Cancelled) | Err(IngestError::Fetch(FetchError::Cancelled)) => {
            let record = SubtaskRecord::terminal(job.id, &url, SubtaskStatus::Cancelled, None);
            let _ = ctx.store.create_subtask(&record).await;
        }
        Err(err) => {
            warn!(url = %url, error = %err, "processing discovered URL failed");
            let record = SubtaskRecord::terminal(
                job.id,
                &url,
                SubtaskStatus::Failed,
                Some(&err.to_string()),
            );
            let _ = ctx.store.create_subtask(&record).await;
        }
    }
}

async fn fetch_parse_materialize<S, A, I>(
    ctx: &PipelineContext<S, A, I>,
    job: &Job,
    feed: &Feed,
    url: &str,
    handles: &HandleSet,
) -> Result<()>
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    let probe = JobCancelProbe::new(ctx.store.as_ref(), job.id);
    let page = ctx.fetcher.fetch_with_retries(url, &probe).await?;

    // relative entry links resolve against the URL the content actually
    // came back from (an archive playback URL keeps its prefix)
    let document = crate::feed::parse_feed(&page.url, &page.body)?;

    ctx.store
        .update_feed_metadata(
            feed.id,
            &document.feed.title,
            &document.feed.description,
            document.feed.feed_type,
        )
        .await?;

    let outcome = materialize_candidates(
        ctx.store.as_ref(),
        job,
        feed,
        document.candidates.into_values(),
    )
    .await?;

    info!(
        url = %url,
        new = outcome.new_posts.len(),
        skipped = outcome.skipped,
        "processed discovered URL"
    );

    schedule_extractions(ctx, job.id, outcome.new_posts, handles);
    Ok(())
}

/// Fan out one extraction unit per newly materialized post.
fn schedule_extractions<S, A, I>(
    ctx: &PipelineContext<S, A, I>,
    job_id: Uuid,
    posts: Vec<MaterializedPost>,
    handles: &HandleSet,
) where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    for item in posts {
        let task_ctx = ctx.clone();
        let handle = ctx.queue.submit(async move {
            extract_one(task_ctx, job_id, item).await;
        });
        handles.add(handle);
    }
}

async fn extract_one<S, A, I>(ctx: PipelineContext<S, A, I>, job_id: Uuid, item: MaterializedPost)
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    let probe = JobCancelProbe::new(ctx.store.as_ref(), job_id);
    if probe.is_cancelled().await {
        let _ = ctx
            .store
            .finish_subtask(item.subtask_id, SubtaskStatus::Cancelled, None)
            .await;
        return;
    }

    if item.post.is_full_text {
        let _ = ctx
            .store
            .finish_subtask(item.subtask_id, SubtaskStatus::Retrieved, None)
            .await;
        return;
    }

    match extract::extract_full_text(&ctx.fetcher, &item.post.link, &probe).await {
        Ok(content) => {
            let stored = ctx
                .store
                .update_post_content(item.post.id, &content.body, &content.content_type, true)
                .await;
            match stored {
                Ok(()) => {
                    let _ = ctx
                        .store
                        .finish_subtask(item.subtask_id, SubtaskStatus::Retrieved, None)
                        .await;
                }
                Err(err) => {
                    let _ = ctx
                        .store
                        .finish_subtask(
                            item.subtask_id,
                            SubtaskStatus::Failed,
                            Some(&err.to_string()),
                        )
                        .await;
                }
            }
        }
        Err(err) => {
            if probe.is_cancelled().await {
                let _ = ctx
                    .store
                    .finish_subtask(item.subtask_id, SubtaskStatus::Cancelled, None)
                    .await;
            } else {
                warn!(link = %item.post.link, error = %err, "full-text extraction failed");
                let _ = ctx
                    .store
                    .finish_subtask(
                        item.subtask_id,
                        SubtaskStatus::Failed,
                        Some(&err.to_string()),
                    )
                    .await;
            }
        }
    }
}

async fn patch_pipeline<S, A, I>(
    ctx: &PipelineContext<S, A, I>,
    job: &Job,
    posts: &[Post],
) -> Result<()>
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    // one record per post, then a sequential extraction chain
    let mut work = Vec::with_capacity(posts.len());
    for post in posts {
        let record = SubtaskRecord::new(job.id, &post.link).with_post(post.id);
        ctx.store.create_subtask(&record).await?;
        work.push((record.id, post.clone()));
    }

    let probe = JobCancelProbe::new(ctx.store.as_ref(), job.id);
    let mut cancelled = false;

    for (subtask_id, post) in work {
        if cancelled || probe.is_cancelled().await {
            cancelled = true;
            ctx.store
                .finish_subtask(subtask_id, SubtaskStatus::Cancelled, None)
                .await?;
            continue;
        }

        // manual reindex re-pulls content regardless of is_full_text
        match extract::extract_full_text(&ctx.fetcher, &post.link, &probe).await {
            Ok(content) => {
                ctx.store
                    .update_post_content(post.id, &content.body, &content.content_type, true)
                    .await?;
                ctx.store
                    .finish_subtask(subtask_id, SubtaskStatus::Retrieved, None)
                    .await?;
            }
            Err(err) => {
                if probe.is_cancelled().await {
                    cancelled = true;
                    ctx.store
                        .finish_subtask(subtask_id, SubtaskStatus::Cancelled, None)
                        .await?;
                } else {
                    warn!(link = %post.link, error = %err, "patch extraction failed");
                    ctx.store
                        .finish_subtask(
                            subtask_id,
                            SubtaskStatus::Failed,
                            Some(&err.to_string()),
                        )
                        .await?;
                }
            }
        }
    }

    if cancelled {
        Err(IngestError::Cancelled)
    } else {
        Ok(())
    }
}

/// Always releases the feed lock, then applies the terminal state:
/// running → success on a clean run; cancellation already recorded its own
/// terminal state and always wins; any other error marks the job failed
/// with its message.
async fn finalize<S, A, I>(
    ctx: &PipelineContext<S, A, I>,
    job: &Job,
    feed: &Feed,
    result: Result<()>,
)
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    if let Err(err) = ctx.lock.release(feed.id).await {
        error!(job_id = %job.id, error = %err, "failed to release feed lock");
    }

    match result {
        Ok(()) => match ctx
            .store
            .transition_job(job.id, JobState::Success, None)
            .await
        {
            Ok(JobState::Success) => info!(job_id = %job.id, "job completed"),
            Ok(other) => debug!(job_id = %job.id, state = ?other, "job already terminal, success not applied"),
            Err(err) => error!(job_id = %job.id, error = %err, "failed to finalize job"),
        },
        Err(IngestError::Cancelled) => {
            info!(job_id = %job.id, "job cancelled");
        }
        Err(err) => {
            error!(job_id = %job.id, error = %err, "job failed");
            let _ = ctx
                .store
                .transition_job(job.id, JobState::Failed, Some(&err.to_string()))
                .await;
        }
    }
}

/// After a join timeout, any record still in flight is moved to timed_out.
async fn mark_inflight_timed_out<S: IngestStore + ?Sized>(store: &S, job_id: Uuid) {
    let Ok(records) = store.subtasks_for_job(job_id).await else {
        return;
    };
    for record in records {
        if !record.status.is_terminal() {
            let _ = store
                .finish_subtask(record.id, SubtaskStatus::TimedOut, Some("join timed out"))
                .await;
        }
    }
}
