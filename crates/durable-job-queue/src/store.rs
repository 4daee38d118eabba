//! Job store abstraction.

use crate::error::QueueResult;
use crate::record::JobRecord;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a pushed job lands in the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Behind every pending job (FIFO).
    Back,
    /// Ahead of every pending job (LIFO); used for retries and recovery.
    Front,
}

/// A job currently held in the active set.
///
/// `raw` is the exact stored payload; stores use it to remove the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub raw: String,
}

impl ActiveJob {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn decode<T: Serialize + DeserializeOwned>(&self) -> QueueResult<JobRecord<T>> {
        JobRecord::decode(&self.raw)
    }
}

/// A dead-lettered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub payload: String,
    pub reason: String,
    pub failed_at: String,
}

/// List sizes, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: usize,
    pub active: usize,
    pub failed: usize,
    pub completed: u64,
}

/// An at-least-once job store.
///
/// Implementations must make `next` move a job from pending to active
/// atomically, so a crash never loses a job that was handed out.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add an encoded job to the pending queue.
    async fn push(&self, payload: String, placement: Placement) -> QueueResult<()>;

    /// Take the next pending job into the active set, waiting up to `wait`.
    async fn next(&self, wait: Duration) -> QueueResult<Option<ActiveJob>>;

    /// Jobs currently in the active set.
    async fn list_active(&self) -> QueueResult<Vec<ActiveJob>>;

    /// Drop a job from the active set without recording an outcome.
    async fn remove_active(&self, job: &ActiveJob) -> QueueResult<()>;

    /// Mark an active job as done.
    async fn complete(&self, job: &ActiveJob) -> QueueResult<()>;

    /// Move an active job to the failed list.
    async fn fail(&self, job: &ActiveJob, reason: &str) -> QueueResult<()>;

    async fn counts(&self) -> QueueResult<JobCounts>;
}
