//! Job orchestration: lifecycle, locking, task queue, and the pipeline
//! runner.

pub mod lock;
pub mod orchestrator;
pub mod queue;
pub(crate) mod runner;

pub use lock::{Acquire, FeedLock};
pub use orchestrator::Orchestrator;
pub use queue::{HandleSet, TaskHandle, TaskQueue};
