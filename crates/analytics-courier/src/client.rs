//! The public analytics client.

use crate::buffer::InternalBuffer;
use crate::completion::{complete_all, Completion, QueueItem};
use crate::config::{ClientConfig, DurableQueueOptions, JobOptions};
use crate::dispatcher::Dispatcher;
use crate::durable::DurableQueue;
use crate::error::{ConfigError, ConfigResult, DeliveryError, QueueSetupError};
use crate::scheduler::{FlushScheduler, FlushState};
use crate::transport::{ReqwestTransport, Transport};
use analytics_message::{validate, Event, LibraryInfo, MessageType, Normalizer, ValidationResult};
use durable_job_queue::{JobStore, QueueKeys, RedisJobStore};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The client is disabled; nothing is ever sent.
    Disabled,
    /// The buffer was empty.
    Empty,
    /// Another cycle holds the buffer; this request was a no-op.
    InProgress,
    /// Sent directly and accepted by the endpoint.
    Delivered { count: usize },
    /// Written to the durable queue; delivery continues in the background.
    Persisted { count: usize },
    /// The runtime shut down before the cycle finished. A batch already cut
    /// from the buffer may not have been sent.
    Cancelled,
}

/// Buffers, batches and delivers analytics events.
///
/// Cloning is cheap and every clone feeds the same buffer. Submissions
/// return as soon as the event is buffered; delivery outcomes arrive through
/// the optional [`Completion`].
///
/// Ordering: events leave the buffer in arrival order. With a durable queue,
/// a batch that fails with a retryable error is requeued at the front, so
/// it is retried before batches persisted after it.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    normalizer: Normalizer,
    buffer: Mutex<InternalBuffer>,
    scheduler: FlushScheduler,
    dispatcher: Arc<Dispatcher>,
    durable: RwLock<Option<Arc<DurableQueue>>>,
    durable_claimed: AtomicBool,
    runtime: Handle,
}

impl Analytics {
    /// Build a client that sends over HTTP.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ClientConfig) -> ConfigResult<Self> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()?))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> ConfigResult<Self> {
        Self::with_library(config, transport, default_library())
    }

    pub fn with_library(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        library: LibraryInfo,
    ) -> ConfigResult<Self> {
        let config = config.normalized()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            config.write_key.clone(),
            config.data_plane_url.clone(),
            config.timeout,
            library.clone(),
            config.retry,
        ));

        debug!(
            url = %config.data_plane_url,
            flush_at = config.flush_at,
            enable = config.enable,
            "Analytics client created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(InternalBuffer::new(config.max_internal_queue_size)),
                normalizer: Normalizer::new(library),
                scheduler: FlushScheduler::new(),
                dispatcher,
                durable: RwLock::new(None),
                durable_claimed: AtomicBool::new(false),
                runtime,
                config,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Events waiting in the in-memory buffer.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn flush_state(&self) -> FlushState {
        self.inner.scheduler.state()
    }

    pub fn flush_timer_armed(&self) -> bool {
        self.inner.scheduler.timer_armed()
    }

    pub fn is_durable(&self) -> bool {
        self.inner.durable.read().is_some()
    }

    pub fn identify(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Identify, message, completion)
    }

    pub fn group(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Group, message, completion)
    }

    pub fn track(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Track, message, completion)
    }

    pub fn page(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Page, message, completion)
    }

    pub fn screen(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Screen, message, completion)
    }

    pub fn alias(&self, message: Value, completion: Option<Completion>) -> ValidationResult<()> {
        self.submit(MessageType::Alias, message, completion)
    }

    /// Validate, normalize and buffer one event.
    ///
    /// Only validation errors surface here; delivery outcomes go to
    /// `completion`.
    pub fn submit(
        &self,
        message_type: MessageType,
        message: Value,
        completion: Option<Completion>,
    ) -> ValidationResult<()> {
        validate(&message, message_type)?;
        let Value::Object(event) = message else {
            return Err(analytics_message::ValidationError::NotAnObject);
        };
        self.inner
            .enqueue(message_type, event, completion.unwrap_or_else(Completion::noop));
        Ok(())
    }

    /// Run one flush cycle now.
    ///
    /// The cycle runs on its own task, so dropping the returned future does
    /// not abandon a batch that was already cut.
    pub async fn flush(&self) -> Result<FlushOutcome, DeliveryError> {
        let inner = self.inner.clone();
        match self.inner.runtime.spawn(async move { inner.flush_cycle().await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(error = %e, "Flush task cancelled by runtime shutdown");
                Ok(FlushOutcome::Cancelled)
            }
        }
    }

    /// Route future flushes through a Redis-backed durable queue.
    ///
    /// Connects, recovers a job left active by a previous process, then
    /// starts the processor. Calling again after a successful (or running)
    /// activation only logs. A failed activation leaves the client sending
    /// directly, and may be retried.
    pub async fn enable_durable_queue(
        &self,
        options: DurableQueueOptions,
    ) -> Result<(), QueueSetupError> {
        if !self.inner.claim_durable() {
            return Ok(());
        }

        let store = match connect_store(&options).await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "Durable queue initialization failed");
                self.inner.durable_claimed.store(false, Ordering::Release);
                return Err(e);
            }
        };

        self.inner
            .install_durable(store, options.job, options.poll_interval)
            .await
    }

    /// Like [`Self::enable_durable_queue`] with a caller-supplied store.
    pub async fn enable_durable_queue_with_store(
        &self,
        store: Arc<dyn JobStore>,
        job: JobOptions,
        poll_interval: Duration,
    ) -> Result<(), QueueSetupError> {
        if !self.inner.claim_durable() {
            return Ok(());
        }
        self.inner.install_durable(store, job, poll_interval).await
    }

    /// Cancel the periodic timer and stop the durable processor.
    ///
    /// Buffered events are not flushed; call [`Self::flush`] first to send
    /// them. A job interrupted mid-backoff stays active in the store and is
    /// recovered on the next activation.
    pub fn shutdown(&self) {
        self.inner.shutdown();
        info!("Analytics client shut down");
    }
}

impl Inner {
    fn enqueue(self: &Arc<Self>, message_type: MessageType, event: Event, completion: Completion) {
        if !self.config.enable {
            completion.complete(Ok(()));
            return;
        }

        let event = self.normalizer.normalize(message_type, event);
        let pushed = self.buffer.lock().push(QueueItem { event, completion });
        let buffered = match pushed {
            Ok(len) => len,
            Err(item) => {
                let capacity = self.config.max_internal_queue_size;
                warn!(
                    capacity,
                    "Not adding event for processing as queue size is at or above max configuration"
                );
                item.completion.complete(Err(DeliveryError::Dropped {
                    buffered: capacity,
                    capacity,
                }));
                return;
            }
        };

        if self.scheduler.claim_first_enqueue() {
            self.spawn_flush();
            return;
        }

        // A running cycle re-checks the buffer when it ends.
        if buffered >= self.config.flush_at {
            if self.scheduler.state() == FlushState::Idle {
                self.spawn_flush();
            } else {
                debug!(buffered, "Flush in progress, leaving events to the running cycle");
            }
        }

        if let Some(interval) = self.config.flush_interval {
            self.arm_timer(interval);
        }
    }

    fn spawn_flush(self: &Arc<Self>) {
        let inner = self.clone();
        self.runtime.spawn(async move {
            let _ = inner.flush_cycle().await;
        });
    }

    fn arm_timer(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        self.scheduler
            .arm(&self.runtime, interval, move |generation| async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.scheduler.disarm(generation) {
                    debug!("Flush interval elapsed");
                    let _ = inner.flush_cycle().await;
                }
            });
    }

    async fn flush_cycle(self: Arc<Self>) -> Result<FlushOutcome, DeliveryError> {
        if !self.config.enable {
            return Ok(FlushOutcome::Disabled);
        }

        let outcome = {
            let Some(_guard) = self.scheduler.try_begin() else {
                return Ok(FlushOutcome::InProgress);
            };
            self.run_cycle().await
        };

        let remaining = self.buffer.lock().len();
        if outcome.is_ok() && remaining >= self.config.flush_at {
            self.spawn_flush();
        } else if remaining > 0 {
            if let Some(interval) = self.config.flush_interval {
                self.arm_timer(interval);
            }
        }

        outcome
    }

    async fn run_cycle(&self) -> Result<FlushOutcome, DeliveryError> {
        self.scheduler.cancel_timer();

        let cut = self.buffer.lock().cut(self.config.flush_at);
        let Some((batch, completions)) = cut else {
            return Ok(FlushOutcome::Empty);
        };
        let count = batch.len();
        let request = self.dispatcher.build_request(&batch);

        let durable = self.durable.read().clone();
        match durable {
            Some(queue) => match queue.persist(request, completions).await {
                Ok(()) => Ok(FlushOutcome::Persisted { count }),
                Err((e, completions)) => {
                    error!(error = %e, count, "Failed to persist batch, returning it to the buffer");
                    self.buffer.lock().restore_front(batch.events, completions);
                    Err(DeliveryError::Persistence(e.to_string()))
                }
            },
            None => {
                let result = self.dispatcher.deliver(request).await;
                complete_all(completions, &result);
                result.map(|()| FlushOutcome::Delivered { count })
            }
        }
    }

    /// First activation wins; later calls log and return.
    fn claim_durable(&self) -> bool {
        if self.durable_claimed.swap(true, Ordering::AcqRel) {
            info!("A durable queue is already initialized, skipping");
            return false;
        }
        true
    }

    async fn install_durable(
        &self,
        store: Arc<dyn JobStore>,
        job: JobOptions,
        poll_interval: Duration,
    ) -> Result<(), QueueSetupError> {
        let queue = Arc::new(DurableQueue::new(
            store,
            self.dispatcher.clone(),
            job,
            poll_interval,
            self.normalizer.library().name.clone(),
        ));

        if let Err(e) = queue.recover().await {
            error!(error = %e, "Durable queue recovery failed, no processor installed");
            self.durable_claimed.store(false, Ordering::Release);
            return Err(e);
        }

        queue.start(&self.runtime);
        *self.durable.write() = Some(queue);
        info!(max_attempts = job.max_attempts, "Durable queue enabled");
        Ok(())
    }

    fn shutdown(&self) {
        self.scheduler.cancel_timer();
        if let Some(queue) = self.durable.read().as_ref() {
            queue.stop();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn connect_store(options: &DurableQueueOptions) -> Result<Arc<dyn JobStore>, QueueSetupError> {
    let redis = options.redis.as_ref().ok_or_else(|| {
        QueueSetupError::Initialization(
            "redis connection parameters not present, cannot make a durable queue".to_string(),
        )
    })?;

    let keys = QueueKeys::new(&options.prefix, &options.queue_name);
    let store = RedisJobStore::connect(redis, keys)
        .await
        .map_err(|e| QueueSetupError::Initialization(e.to_string()))?;
    Ok(Arc::new(store))
}

fn default_library() -> LibraryInfo {
    LibraryInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
