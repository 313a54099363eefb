//! In-memory storage implementation for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::traits::lock::LockStore;
use crate::traits::store::{FeedStore, JobStore, PostStore};
use crate::types::{Category, Feed, FeedType, Job, JobState, Post, SubtaskRecord, SubtaskStatus};

/// In-memory store for feeds, posts, jobs, and the feed lock.
///
/// Useful for testing and development. Not suitable for production as data
/// is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    feeds: RwLock<HashMap<Uuid, Feed>>,
    posts: RwLock<HashMap<Uuid, Post>>,
    post_links: RwLock<HashMap<(Uuid, String), Uuid>>,
    categories: RwLock<HashMap<String, Category>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    subtasks: RwLock<HashMap<Uuid, SubtaskRecord>>,
    locks: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_count(&self) -> usize {
        self.posts.read().unwrap().len()
    }

    pub fn subtask_count(&self) -> usize {
        self.subtasks.read().unwrap().len()
    }

    pub fn category_count(&self) -> usize {
        self.categories.read().unwrap().len()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn get_feed(&self, id: Uuid) -> Result<Option<Feed>> {
        Ok(self.feeds.read().unwrap().get(&id).cloned())
    }

    async fn upsert_feed(&self, feed: &Feed) -> Result<()> {
        self.feeds.write().unwrap().insert(feed.id, feed.clone());
        Ok(())
    }

    async fn update_feed_metadata(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
        feed_type: FeedType,
    ) -> Result<()> {
        let mut feeds = self.feeds.write().unwrap();
        let feed = feeds
            .get_mut(&id)
            .ok_or(IngestError::FeedNotFound { id })?;
        feed.title = Some(title.to_string());
        feed.description = Some(description.to_string());
        feed.feed_type = feed_type;
        feed.updated_at = Utc::now();
        Ok(())
    }

    async fn fold_feed_pubdate(&self, id: Uuid, pubdate: DateTime<Utc>) -> Result<()> {
        let mut feeds = self.feeds.write().unwrap();
        let feed = feeds
            .get_mut(&id)
            .ok_or(IngestError::FeedNotFound { id })?;
        feed.fold_item_pubdate(pubdate);
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn get_post_by_link(&self, feed_id: Uuid, link: &str) -> Result<Option<Post>> {
        let links = self.post_links.read().unwrap();
        let Some(post_id) = links.get(&(feed_id, link.to_string())) else {
            return Ok(None);
        };
        Ok(self.posts.read().unwrap().get(post_id).cloned())
    }

    async fn get_or_create_post(&self, post: Post) -> Result<(Post, bool)> {
        let mut links = self.post_links.write().unwrap();
        let key = (post.feed_id, post.link.clone());
        if let Some(existing_id) = links.get(&key) {
            let existing = self
                .posts
                .read()
                .unwrap()
                .get(existing_id)
                .cloned()
                .expect("link index references a stored post");
            return Ok((existing, false));
        }
        links.insert(key, post.id);
        self.posts.write().unwrap().insert(post.id, post.clone());
        Ok((post, true))
    }

    async fn update_post_content(
        &self,
        id: Uuid,
        description: &str,
        content_type: &str,
        is_full_text: bool,
    ) -> Result<()> {
        let mut posts = self.posts.write().unwrap();
        if let Some(post) = posts.get_mut(&id) {
            post.description = description.to_string();
            post.content_type = content_type.to_string();
            post.is_full_text = is_full_text;
            post.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_or_create_category(&self, name: &str) -> Result<Category> {
        let mut categories = self.categories.write().unwrap();
        Ok(categories
            .entry(name.to_string())
            .or_insert_with(|| Category::new(name))
            .clone())
    }

    async fn add_post_categories(&self, post_id: Uuid, names: &[String]) -> Result<()> {
        for name in names {
            self.get_or_create_category(name).await?;
        }
        let mut posts = self.posts.write().unwrap();
        if let Some(post) = posts.get_mut(&post_id) {
            for name in names {
                if !post.categories.contains(name) {
                    post.categories.push(name.clone());
                }
            }
        }
        Ok(())
    }

    async fn posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>> {
        Ok(self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| p.feed_id == feed_id)
            .cloned()
            .collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.read().unwrap().get(&id).cloned())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().unwrap().get(&id).cloned())
    }

    async fn job_state(&self, id: Uuid) -> Result<Option<JobState>> {
        Ok(self.jobs.read().unwrap().get(&id).map(|job| job.state))
    }

    async fn transition_job(
        &self,
        id: Uuid,
        to: JobState,
        info: Option<&str>,
    ) -> Result<JobState> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or(IngestError::JobNotFound { id })?;
        if job.state.can_transition(to) {
            job.state = to;
            if let Some(info) = info {
                job.info = Some(info.to_string());
            }
        }
        Ok(job.state)
    }

    async fn jobs_in_states(&self, states: &[JobState]) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|job| states.contains(&job.state))
            .cloned()
            .collect())
    }

    async fn create_subtask(&self, record: &SubtaskRecord) -> Result<()> {
        self.subtasks
            .write()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn finish_subtask(
        &self,
        id: Uuid,
        status: SubtaskStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut subtasks = self.subtasks.write().unwrap();
        if let Some(record) = subtasks.get_mut(&id) {
            // one-way: terminal records stay as they are
            if !record.status.is_terminal() {
                record.status = status;
                record.error = error.map(str::to_string);
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn subtasks_for_job(&self, job_id: Uuid) -> Result<Vec<SubtaskRecord>> {
        let mut records: Vec<SubtaskRecord> = self
            .subtasks
            .read()
            .unwrap()
            .values()
            .filter(|record| record.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut locks = self.locks.write().unwrap();
        let now = Instant::now();
        if let Some((_, expires_at)) = locks.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        locks.insert(key.to_string(), (holder.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.locks.write().unwrap().remove(key);
        Ok(())
    }

    async fn holder(&self, key: &str) -> Result<Option<String>> {
        let locks = self.locks.read().unwrap();
        Ok(locks.get(key).and_then(|(holder, expires_at)| {
            (*expires_at > Instant::now()).then(|| holder.clone())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostCandidate;
    use chrono::TimeZone;

    fn feed() -> Feed {
        Feed::new("https://example.com/rss.xml", FeedType::Rss)
    }

    fn candidate(link: &str) -> PostCandidate {
        PostCandidate::new(
            link,
            "Title",
            Utc.with_ymd_and_hms(2022, 5, 4, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn get_or_create_is_first_write_wins() {
        let store = MemoryStore::new();
        let feed = feed();

        let first = Post::from_candidate(feed.id, &candidate("https://example.com/a"));
        let (_, created) = store.get_or_create_post(first.clone()).await.unwrap();
        assert!(created);

        let mut second = Post::from_candidate(feed.id, &candidate("https://example.com/a"));
        second.title = "Different title".to_string();
        let (existing, created) = store.get_or_create_post(second).await.unwrap();
        assert!(!created);
        assert_eq!(existing.title, "Title");
        assert_eq!(store.post_count(), 1);
    }

    #[tokio::test]
    async fn job_transitions_are_guarded() {
        let store = MemoryStore::new();
        let feed = feed();
        store.upsert_feed(&feed).await.unwrap();

        let job = Job::new(&feed, false, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        store.create_job(&job).await.unwrap();

        // success straight from pending is rejected
        let state = store
            .transition_job(job.id, JobState::Success, None)
            .await
            .unwrap();
        assert_eq!(state, JobState::Pending);

        store
            .transition_job(job.id, JobState::Running, None)
            .await
            .unwrap();
        store
            .transition_job(job.id, JobState::Cancelled, None)
            .await
            .unwrap();

        // a late success never overwrites the terminal state
        let state = store
            .transition_job(job.id, JobState::Success, None)
            .await
            .unwrap();
        assert_eq!(state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn finished_subtasks_are_sticky() {
        let store = MemoryStore::new();
        let record = SubtaskRecord::new(Uuid::new_v4(), "https://example.com/a");
        store.create_subtask(&record).await.unwrap();

        store
            .finish_subtask(record.id, SubtaskStatus::Cancelled, None)
            .await
            .unwrap();
        store
            .finish_subtask(record.id, SubtaskStatus::Retrieved, None)
            .await
            .unwrap();

        let records = store.subtasks_for_job(record.job_id).await.unwrap();
        assert_eq!(records[0].status, SubtaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn lock_is_add_if_absent_with_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.try_acquire("feed-1", "job-a", ttl).await.unwrap());
        assert!(!store.try_acquire("feed-1", "job-b", ttl).await.unwrap());
        assert_eq!(
            store.holder("feed-1").await.unwrap().as_deref(),
            Some("job-a")
        );

        store.release("feed-1").await.unwrap();
        assert!(store.try_acquire("feed-1", "job-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_counts_as_absent() {
        let store = MemoryStore::new();
        assert!(store
            .try_acquire("feed-1", "job-a", Duration::from_millis(0))
            .await
            .unwrap());
        assert!(store
            .try_acquire("feed-1", "job-b", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn categories_deduplicate_case_sensitively() {
        let store = MemoryStore::new();
        store.get_or_create_category("Rust").await.unwrap();
        store.get_or_create_category("Rust").await.unwrap();
        store.get_or_create_category("rust").await.unwrap();
        assert_eq!(store.category_count(), 2);
    }
}
