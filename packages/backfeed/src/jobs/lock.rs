//! Per-feed mutual exclusion over the keyed lock store.
//!
//! At most one active job per feed. A new ingest job fails fast on a held
//! lock; a patch job was already accepted, so it retries acquisition with
//! bounded backoff before giving up.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::traits::lock::LockStore;

/// Outcome of a fail-fast acquisition attempt.
#[derive(Debug)]
pub enum Acquire {
    Acquired,
    /// Lock is held; carries the holder's job id
    Held(Uuid),
}

/// Lock manager keyed by feed id, holder = job id, TTL-bounded.
#[derive(Clone)]
pub struct FeedLock {
    store: Arc<dyn LockStore>,
    ttl: Duration,
}

impl FeedLock {
    pub fn new(store: Arc<dyn LockStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(feed_id: Uuid) -> String {
        format!("feed-lock:{feed_id}")
    }

    /// Fail-fast acquisition (new-job path). On a held lock, reports the
    /// holding job's id.
    pub async fn try_acquire(&self, feed_id: Uuid, job_id: Uuid) -> Result<Acquire> {
        let key = Self::key(feed_id);
        loop {
            if self
                .store
                .try_acquire(&key, &job_id.to_string(), self.ttl)
                .await?
            {
                debug!(feed_id = %feed_id, job_id = %job_id, "feed lock acquired");
                return Ok(Acquire::Acquired);
            }
            match self.store.holder(&key).await? {
                Some(holder) => {
                    let holder_id = holder.parse().unwrap_or(Uuid::nil());
                    return Ok(Acquire::Held(holder_id));
                }
                // holder expired between the two calls; try again
                None => continue,
            }
        }
    }

    /// Bounded-backoff acquisition (patch-job path).
    pub async fn acquire_with_retry(
        &self,
        feed_id: Uuid,
        job_id: Uuid,
        attempts: u32,
        base_backoff: Duration,
        multiplier: f64,
    ) -> Result<bool> {
        for attempt in 0..=attempts {
            if attempt > 0 {
                let factor = multiplier.powi(attempt as i32 - 1);
                tokio::time::sleep(base_backoff.mul_f64(factor)).await;
            }
            if self
                .store
                .try_acquire(&Self::key(feed_id), &job_id.to_string(), self.ttl)
                .await?
            {
                debug!(feed_id = %feed_id, job_id = %job_id, attempt = attempt, "feed lock acquired");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Release unconditionally; releasing an unheld lock is a no-op.
    pub async fn release(&self, feed_id: Uuid) -> Result<()> {
        self.store.release(&Self::key(feed_id)).await
    }

    /// Current holder's job id, if any.
    pub async fn holder(&self, feed_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self
            .store
            .holder(&Self::key(feed_id))
            .await?
            .and_then(|raw| raw.parse().ok()))
    }
}
