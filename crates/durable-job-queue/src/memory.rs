//! In-process job store.
//!
//! Same list semantics as the Redis store, without persistence across
//! restarts. Useful for embedding without Redis and for tests, where
//! [`InMemoryJobStore::seed_active`] simulates a job left behind by a
//! crashed process.

use crate::error::QueueResult;
use crate::store::{ActiveJob, FailedJob, JobCounts, JobStore, Placement};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct Lists {
    /// Front is handed out next.
    wait: VecDeque<String>,
    active: Vec<String>,
    failed: Vec<FailedJob>,
    completed: u64,
}

/// In-memory [`JobStore`].
#[derive(Default)]
pub struct InMemoryJobStore {
    lists: Mutex<Lists>,
    pushed: Notify,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a payload directly into the active set.
    pub fn seed_active(&self, payload: impl Into<String>) {
        self.lists.lock().active.push(payload.into());
    }

    /// Pending payloads, next-to-run first.
    pub fn waiting(&self) -> Vec<String> {
        self.lists.lock().wait.iter().cloned().collect()
    }

    pub fn failed(&self) -> Vec<FailedJob> {
        self.lists.lock().failed.clone()
    }

    fn try_take(&self) -> Option<ActiveJob> {
        let mut lists = self.lists.lock();
        let raw = lists.wait.pop_front()?;
        lists.active.push(raw.clone());
        Some(ActiveJob::new(raw))
    }

    fn remove_from_active(lists: &mut Lists, raw: &str) -> bool {
        match lists.active.iter().position(|entry| entry == raw) {
            Some(index) => {
                lists.active.remove(index);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn push(&self, payload: String, placement: Placement) -> QueueResult<()> {
        {
            let mut lists = self.lists.lock();
            match placement {
                Placement::Back => lists.wait.push_back(payload),
                Placement::Front => lists.wait.push_front(payload),
            }
        }
        self.pushed.notify_one();
        Ok(())
    }

    async fn next(&self, wait: Duration) -> QueueResult<Option<ActiveJob>> {
        let deadline = Instant::now() + wait;
        loop {
            let pushed = self.pushed.notified();
            if let Some(job) = self.try_take() {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                return Ok(self.try_take());
            }
        }
    }

    async fn list_active(&self) -> QueueResult<Vec<ActiveJob>> {
        Ok(self
            .lists
            .lock()
            .active
            .iter()
            .cloned()
            .map(ActiveJob::new)
            .collect())
    }

    async fn remove_active(&self, job: &ActiveJob) -> QueueResult<()> {
        Self::remove_from_active(&mut self.lists.lock(), &job.raw);
        Ok(())
    }

    async fn complete(&self, job: &ActiveJob) -> QueueResult<()> {
        let mut lists = self.lists.lock();
        if Self::remove_from_active(&mut lists, &job.raw) {
            lists.completed += 1;
        }
        Ok(())
    }

    async fn fail(&self, job: &ActiveJob, reason: &str) -> QueueResult<()> {
        let mut lists = self.lists.lock();
        Self::remove_from_active(&mut lists, &job.raw);
        lists.failed.push(FailedJob {
            payload: job.raw.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        Ok(())
    }

    async fn counts(&self) -> QueueResult<JobCounts> {
        let lists = self.lists.lock();
        Ok(JobCounts {
            waiting: lists.wait.len(),
            active: lists.active.len(),
            failed: lists.failed.len(),
            completed: lists.completed,
        })
    }
}
