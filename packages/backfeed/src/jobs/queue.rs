//! Task-queue abstraction for the pipeline.
//!
//! Units of work are independently scheduled tokio tasks; the only thing
//! the queue shares between them is a completion flag per handle. There is
//! no cross-worker blocking primitive: the join step is a self-re-arming
//! poll that checks the fanned-out handles and goes back to sleep, bounded
//! by a maximum poll count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{IngestError, Result};

/// Completion handle for one submitted unit of work.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    done: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// A growable set of handles; fan-out stages register their spawned units
/// here so the join stage can watch all of them, including units spawned
/// by other units.
#[derive(Debug, Clone, Default)]
pub struct HandleSet {
    inner: Arc<Mutex<Vec<TaskHandle>>>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: TaskHandle) {
        self.inner.lock().unwrap().push(handle);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn all_complete(&self) -> bool {
        self.inner.lock().unwrap().iter().all(TaskHandle::is_complete)
    }
}

/// Thin submission layer over the tokio runtime with a process-shutdown
/// token. Cloning yields another submitter for the same queue.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    shutdown: CancellationToken,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit one unit of work. The handle completes when the unit
    /// finishes or the queue shuts down underneath it.
    pub fn submit<F>(&self, work: F) -> TaskHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = work => {}
            }
            flag.store(true, Ordering::Release);
        });

        TaskHandle { done }
    }

    /// Stop accepting progress: in-flight units are dropped at their next
    /// await point and their handles complete.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every handle in `handles` to complete by polling: check,
    /// sleep `poll_interval`, re-arm — at most `max_polls` times before
    /// declaring the join timed out. Handles added to the set while the
    /// poll sleeps are picked up on the next check.
    pub async fn join_with_retry(
        &self,
        handles: &HandleSet,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<()> {
        for _ in 0..max_polls {
            if handles.all_complete() {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
        if handles.all_complete() {
            return Ok(());
        }
        warn!(
            pending = handles.len(),
            polls = max_polls,
            "join poll budget exhausted"
        );
        Err(IngestError::JoinTimedOut { polls: max_polls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_work_completes_its_handle() {
        let queue = TaskQueue::new();
        let handle = queue.submit(async {});
        // handle completion is asynchronous; poll briefly
        for _ in 0..50 {
            if handle.is_complete() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("handle never completed");
    }

    #[tokio::test]
    async fn join_waits_for_late_handles() {
        let queue = TaskQueue::new();
        let handles = HandleSet::new();

        let inner_queue = queue.clone();
        let inner_handles = handles.clone();
        handles.add(queue.submit(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            // a unit fanning out further units mid-flight
            inner_handles.add(inner_queue.submit(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }));

        queue
            .join_with_retry(&handles, Duration::from_millis(2), 200)
            .await
            .unwrap();
        assert_eq!(handles.len(), 2);
        assert!(handles.all_complete());
    }

    #[tokio::test]
    async fn join_times_out_when_the_budget_runs_dry() {
        let queue = TaskQueue::new();
        let handles = HandleSet::new();
        handles.add(queue.submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));

        let err = queue
            .join_with_retry(&handles, Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::JoinTimedOut { polls: 3 }));
    }

    #[tokio::test]
    async fn empty_handle_set_joins_immediately() {
        let queue = TaskQueue::new();
        let handles = HandleSet::new();
        queue
            .join_with_retry(&handles, Duration::from_secs(10), 1)
            .await
            .unwrap();
    }
}
