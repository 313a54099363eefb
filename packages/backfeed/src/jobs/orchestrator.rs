//! Job lifecycle management: the surface the CRUD layer calls.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::jobs::lock::{Acquire, FeedLock};
use crate::jobs::queue::TaskQueue;
use crate::jobs::runner::{self, PipelineContext};
use crate::traits::archive::ArchiveIndex;
use crate::traits::lock::LockStore;
use crate::traits::search::SearchIndex;
use crate::traits::store::IngestStore;
use crate::types::{IngestConfig, Job, JobProgress, JobState, Post};

/// Orchestrates ingest and patch jobs over the collaborator seams:
/// persistence, the lock store, the archive index, and the search index.
pub struct Orchestrator<S, A, I> {
    ctx: PipelineContext<S, A, I>,
}

impl<S, A, I> Orchestrator<S, A, I>
where
    S: IngestStore + 'static,
    A: ArchiveIndex + 'static,
    I: SearchIndex + 'static,
{
    pub fn new(
        store: Arc<S>,
        lock_store: Arc<dyn LockStore>,
        archive: Arc<A>,
        search: Arc<I>,
        config: IngestConfig,
    ) -> Self {
        let config = Arc::new(config);
        let fetcher = Arc::new(Fetcher::new(&config));
        let lock = FeedLock::new(lock_store, config.lock_ttl);
        Self {
            ctx: PipelineContext {
                store,
                lock,
                archive,
                search,
                fetcher,
                queue: TaskQueue::new(),
                config,
            },
        }
    }

    /// Replace the fetcher (tests inject one pointed at mock servers).
    pub fn with_fetcher(mut self, fetcher: Arc<Fetcher>) -> Self {
        self.ctx.fetcher = fetcher;
        self
    }

    /// Start an ingest job for a feed: discovery, per-URL fetch/parse,
    /// materialization, and full-text extraction.
    ///
    /// Fails fast with [`IngestError::FeedBusy`] naming the holding job
    /// when another job already owns the feed's lock; the rejected job is
    /// persisted as failed, never as running.
    pub async fn start_ingest_job(&self, feed_id: Uuid, include_remote_blogs: bool) -> Result<Job> {
        let feed = self
            .ctx
            .store
            .get_feed(feed_id)
            .await?
            .ok_or(IngestError::FeedNotFound { id: feed_id })?;

        let job = Job::new(&feed, include_remote_blogs, self.ctx.config.default_earliest);
        self.ctx.store.create_job(&job).await?;

        match self.ctx.lock.try_acquire(feed.id, job.id).await? {
            Acquire::Acquired => {}
            Acquire::Held(holder) => {
                self.ctx
                    .store
                    .transition_job(
                        job.id,
                        JobState::Failed,
                        Some(&format!("feed is locked by job {holder}")),
                    )
                    .await?;
                return Err(IngestError::FeedBusy { job_id: holder });
            }
        }

        info!(job_id = %job.id, feed = %feed.url, "ingest job accepted");
        let task_ctx = self.ctx.clone();
        let task_job = job.clone();
        self.ctx.queue.submit(async move {
            runner::run_ingest(task_ctx, task_job, feed).await;
        });

        Ok(job)
    }

    /// Start a patch job re-pulling full text for an explicit set of
    /// already-known posts (manual reindex). Lock acquisition happens
    /// inside the worker, with bounded backoff.
    pub async fn start_patch_posts_job(
        &self,
        feed_id: Uuid,
        post_ids: &[Uuid],
        include_remote_blogs: bool,
    ) -> Result<Job> {
        let feed = self
            .ctx
            .store
            .get_feed(feed_id)
            .await?
            .ok_or(IngestError::FeedNotFound { id: feed_id })?;

        let mut posts: Vec<Post> = Vec::with_capacity(post_ids.len());
        for post_id in post_ids {
            match self.ctx.store.get_post(*post_id).await? {
                Some(post) if post.feed_id == feed.id => posts.push(post),
                Some(post) => {
                    warn!(post_id = %post.id, "patch request names a post from another feed, skipping");
                }
                None => {
                    warn!(post_id = %post_id, "patch request names an unknown post, skipping");
                }
            }
        }

        let job = Job::new(&feed, include_remote_blogs, self.ctx.config.default_earliest);
        self.ctx.store.create_job(&job).await?;

        info!(job_id = %job.id, feed = %feed.url, posts = posts.len(), "patch job accepted");
        let task_ctx = self.ctx.clone();
        let task_job = job.clone();
        self.ctx.queue.submit(async move {
            runner::run_patch(task_ctx, task_job, feed, posts).await;
        });

        Ok(job)
    }

    /// Cancel a job. Takes effect immediately in the store; in-flight
    /// workers notice cooperatively at their next check and record
    /// cancelled subtasks instead of completing. Already-terminal jobs
    /// are left as they are.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobState> {
        self.ctx
            .store
            .get_job(job_id)
            .await?
            .ok_or(IngestError::JobNotFound { id: job_id })?;
        let state = self
            .ctx
            .store
            .transition_job(job_id, JobState::Cancelled, None)
            .await?;
        info!(job_id = %job_id, state = ?state, "cancel requested");
        Ok(state)
    }

    /// A job's subtask records bucketed by status.
    pub async fn job_progress(&self, job_id: Uuid) -> Result<JobProgress> {
        self.ctx
            .store
            .get_job(job_id)
            .await?
            .ok_or(IngestError::JobNotFound { id: job_id })?;
        let records = self.ctx.store.subtasks_for_job(job_id).await?;
        Ok(JobProgress::from_records(records))
    }

    /// Current job record.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.ctx.store.get_job(job_id).await
    }

    /// Startup recovery: a pending or running job left over from a prior
    /// process is forcibly cancelled and its feed lock released — a
    /// half-finished job must never appear still in progress.
    pub async fn recover_interrupted_jobs(&self) -> Result<Vec<Uuid>> {
        let interrupted = self
            .ctx
            .store
            .jobs_in_states(&[JobState::Pending, JobState::Running])
            .await?;

        let mut recovered = Vec::with_capacity(interrupted.len());
        for job in interrupted {
            warn!(job_id = %job.id, state = ?job.state, "cancelling job interrupted by restart");
            self.ctx
                .store
                .transition_job(
                    job.id,
                    JobState::Cancelled,
                    Some("interrupted by process restart"),
                )
                .await?;
            self.ctx.lock.release(job.feed_id).await?;
            recovered.push(job.id);
        }
        Ok(recovered)
    }

    /// Stop accepting pipeline progress (process shutdown).
    pub fn shutdown(&self) {
        self.ctx.queue.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::traits::archive::MockArchiveIndex;
    use crate::traits::search::MockSearchIndex;
    use crate::traits::store::{FeedStore, JobStore};
    use crate::types::{Feed, FeedType};
    use std::time::Duration;

    fn orchestrator(
        store: Arc<MemoryStore>,
    ) -> Orchestrator<MemoryStore, MockArchiveIndex, MockSearchIndex> {
        let config = IngestConfig::default()
            .with_retry_count(0)
            .with_base_backoff(Duration::from_millis(1))
            .with_join_policy(Duration::from_millis(5), 200);
        Orchestrator::new(
            Arc::clone(&store),
            store,
            Arc::new(MockArchiveIndex::new()),
            Arc::new(MockSearchIndex::new()),
            config,
        )
    }

    async fn seeded_feed(store: &MemoryStore) -> Feed {
        let feed = Feed::new("https://example.com/rss.xml", FeedType::Rss);
        store.upsert_feed(&feed).await.unwrap();
        feed
    }

    #[tokio::test]
    async fn unknown_feed_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(Arc::clone(&store));
        let err = orchestrator
            .start_ingest_job(Uuid::new_v4(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FeedNotFound { .. }));
    }

    #[tokio::test]
    async fn busy_feed_names_the_holding_job() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(Arc::clone(&store));
        let feed = seeded_feed(&store).await;

        // hold the lock the way a running job would
        let holder = Uuid::new_v4();
        match orchestrator
            .ctx
            .lock
            .try_acquire(feed.id, holder)
            .await
            .unwrap()
        {
            Acquire::Acquired => {}
            Acquire::Held(_) => panic!("lock unexpectedly held"),
        }

        let err = orchestrator
            .start_ingest_job(feed.id, false)
            .await
            .unwrap_err();
        match err {
            IngestError::FeedBusy { job_id } => assert_eq!(job_id, holder),
            other => panic!("expected FeedBusy, got {other:?}"),
        }

        // the rejected job is persisted failed, not running
        let jobs = store
            .jobs_in_states(&[JobState::Failed])
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].info.as_deref().unwrap().contains(&holder.to_string()));
    }

    #[tokio::test]
    async fn cancel_refuses_unknown_jobs() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store);
        let err = orchestrator.cancel_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, IngestError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn recovery_cancels_interrupted_jobs_and_frees_locks() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(Arc::clone(&store));
        let feed = seeded_feed(&store).await;

        // simulate a crash: a running job with a held lock
        let mut job = Job::new(&feed, false, orchestrator.ctx.config.default_earliest);
        job.state = JobState::Running;
        store.create_job(&job).await.unwrap();
        orchestrator
            .ctx
            .lock
            .try_acquire(feed.id, job.id)
            .await
            .unwrap();

        let recovered = orchestrator.recover_interrupted_jobs().await.unwrap();
        assert_eq!(recovered, vec![job.id]);
        assert_eq!(
            store.job_state(job.id).await.unwrap(),
            Some(JobState::Cancelled)
        );

        // the feed is usable again
        assert!(matches!(
            orchestrator
                .ctx
                .lock
                .try_acquire(feed.id, Uuid::new_v4())
                .await
                .unwrap(),
            Acquire::Acquired
        ));
    }
}
