//! Durable queue adapter: persists batches as jobs and drains them with a
//! single worker.
//!
//! A job's lifecycle:
//!
//! ```text
//! pending ──▶ attempting ──▶ done       (delivered, or terminal error)
//!                        ├─▶ requeued   (retryable: fresh job at the front, attempts + 1)
//!                        └─▶ failed     (attempt ceiling reached, dead-lettered)
//! ```
//!
//! Retries jump ahead of batches that were queued after the failing one.

use crate::completion::{complete_all, Completion, DeliveryResult};
use crate::config::JobOptions;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::{DeliveryError, QueueSetupError};
use crate::retry::durable_backoff;
use analytics_message::content_digest;
use durable_job_queue::{ActiveJob, JobRecord, JobStore, Placement, QueueError, QueueResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pause after a store error before the worker tries again.
const STORE_ERROR_DELAY: Duration = Duration::from_secs(1);

pub(crate) type PersistFailure = (QueueError, Vec<Completion>);

pub(crate) struct DurableQueue {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    options: JobOptions,
    poll_interval: Duration,
    library_name: String,
    /// Continuations of jobs persisted by this process, keyed by job id.
    pending: Mutex<HashMap<String, Vec<Completion>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DurableQueue {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        options: JobOptions,
        poll_interval: Duration,
        library_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            options,
            poll_interval,
            library_name: library_name.into(),
            pending: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
        }
    }

    /// Return a job stranded in `active` by a previous process to the
    /// front of the queue with its attempt counter reset.
    pub async fn recover(&self) -> Result<(), QueueSetupError> {
        let active = self.store.list_active().await?;

        match active.as_slice() {
            [] => {
                info!("No active jobs while starting up the durable queue");
            }
            [job] => match job.decode::<DispatchRequest>() {
                Ok(record) => {
                    let description = record.description.clone();
                    let stale_attempts = record.attempts;
                    let payload = record.with_attempts(0).encode()?;
                    self.store.remove_active(job).await?;
                    self.store.push(payload, Placement::Front).await?;
                    info!(
                        job = %description,
                        stale_attempts,
                        "Recovered active job to the front of the queue"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Stale active job is unreadable, dead-lettering it");
                    self.store
                        .fail(job, &format!("unreadable job payload: {e}"))
                        .await?;
                }
            },
            jobs => {
                error!(
                    active = jobs.len(),
                    "More than one active job while starting up the durable queue"
                );
                return Err(QueueSetupError::InvariantViolation { active: jobs.len() });
            }
        }
        Ok(())
    }

    /// Install the single job processor.
    pub fn start(self: &Arc<Self>, runtime: &Handle) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let queue = self.clone();
        *worker = Some(runtime.spawn(async move { queue.run().await }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }

    /// Persist a request as a new job. On failure the continuations are
    /// handed back so the caller keeps ownership of the items.
    pub async fn persist(
        &self,
        request: DispatchRequest,
        completions: Vec<Completion>,
    ) -> Result<(), PersistFailure> {
        let id = Uuid::new_v4().to_string();
        let description = format!(
            "{}-{}-{}",
            self.library_name,
            content_digest(&request),
            Uuid::new_v4()
        );
        let events = request.body.batch.len();

        let payload = match JobRecord::new(id.clone(), description.clone(), request).encode() {
            Ok(payload) => payload,
            Err(e) => return Err((e, completions)),
        };

        self.pending.lock().insert(id.clone(), completions);
        if let Err(e) = self.store.push(payload, Placement::Back).await {
            let completions = self.pending.lock().remove(&id).unwrap_or_default();
            return Err((e, completions));
        }

        debug!(job = %description, events, "Batch persisted to durable queue");
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        info!("Durable queue processor started");
        loop {
            match self.store.next(self.poll_interval).await {
                Ok(Some(job)) => self.process(&job).await,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Durable queue store unavailable, retrying");
                    tokio::time::sleep(STORE_ERROR_DELAY).await;
                }
            }
        }
    }

    /// Drive one job to a recorded outcome. The worker does not poll for
    /// another job until the store has accepted this one's outcome.
    async fn process(&self, job: &ActiveJob) {
        let store = &self.store;

        let record = match job.decode::<DispatchRequest>() {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Unreadable job payload, dead-lettering it");
                let reason = format!("unreadable job payload: {e}");
                let reason = reason.as_str();
                self.until_stored("fail", move || store.fail(job, reason))
                    .await;
                return;
            }
        };

        if record.attempts >= self.options.max_attempts {
            warn!(
                job = %record.description,
                attempts = record.attempts,
                "Job pushed to failed queue, skipping further retries"
            );
            self.resolve(
                &record.id,
                Err(DeliveryError::Abandoned {
                    attempts: record.attempts,
                }),
            );
            let reason = format!("max attempts ({}) reached", self.options.max_attempts);
            let reason = reason.as_str();
            self.until_stored("fail", move || store.fail(job, reason))
                .await;
            return;
        }

        tokio::time::sleep(durable_backoff(record.attempts)).await;

        let mut request = record.data.clone();
        match self.dispatcher.attempt(&mut request).await {
            Ok(()) => {
                self.resolve(&record.id, Ok(()));
                self.until_stored("complete", move || store.complete(job))
                    .await;
                info!(job = %record.description, attempts = record.attempts, "Job completed");
            }
            Err(e) if e.is_retryable() => {
                let attempts = record.attempts + 1;
                let description = record.description.clone();
                let id = record.id.clone();
                let payload = match record.with_attempts(attempts).encode() {
                    Ok(payload) => payload,
                    Err(encode_error) => {
                        error!(
                            job = %description,
                            error = %encode_error,
                            "Cannot re-encode job, dead-lettering it"
                        );
                        let result = Err(DeliveryError::Persistence(encode_error.to_string()));
                        self.resolve(&id, result);
                        let reason = encode_error.to_string();
                        let reason = reason.as_str();
                        self.until_stored("fail", move || store.fail(job, reason))
                            .await;
                        return;
                    }
                };
                self.until_stored("requeue", move || {
                    store.push(payload.clone(), Placement::Front)
                })
                .await;
                self.until_stored("complete", move || store.complete(job))
                    .await;
                warn!(
                    job = %description,
                    attempts,
                    error = %e,
                    "Job failed, requeued at the front"
                );
            }
            Err(e) => {
                warn!(job = %record.description, error = %e, "Job failed with a terminal error");
                self.resolve(&record.id, Err(e.clone()));
                let reason = e.to_string();
                let reason = reason.as_str();
                self.until_stored("fail", move || store.fail(job, reason))
                    .await;
            }
        }
    }

    /// Repeat a store write until it succeeds. Only `stop()` ends the wait.
    async fn until_stored<F, Fut>(&self, operation: &str, mut write: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueueResult<()>>,
    {
        loop {
            match write().await {
                Ok(()) => return,
                Err(e) => {
                    error!(operation, error = %e, "Durable queue store error, retrying");
                    tokio::time::sleep(STORE_ERROR_DELAY).await;
                }
            }
        }
    }

    fn resolve(&self, id: &str, result: DeliveryResult) {
        let completions = self.pending.lock().remove(id);
        if let Some(completions) = completions {
            complete_all(completions, &result);
        }
    }
}
