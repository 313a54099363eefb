//! Keyed lock store for per-feed mutual exclusion.
//!
//! The store only promises atomic add-if-absent with a TTL; the locking
//! policy (who retries, who fails fast) lives in [`crate::jobs::FeedLock`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A keyed cache store supporting atomic add-if-absent with TTL.
///
/// Used as the advisory feed lock: key = feed id, value = holder job id.
/// An expired entry counts as absent, so a crashed holder cannot wedge its
/// feed past the TTL.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `holder` under `key` if the key is absent or expired.
    /// Returns whether the lock was acquired.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Delete the key unconditionally. Releasing an already-released lock
    /// is not an error.
    async fn release(&self, key: &str) -> Result<()>;

    /// Current unexpired holder of the key, if any.
    async fn holder(&self, key: &str) -> Result<Option<String>>;
}
