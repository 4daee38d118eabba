//! Analytics courier: buffered, batched, retried delivery of analytics events.
//!
//! Events submitted through [`Analytics`] are validated, normalized and
//! buffered in memory. A flush cycle cuts up to `flush_at` events into a
//! batch and either sends it over HTTP (direct mode) or persists it as a job
//! in a durable queue that a single background worker drains.
//!
//! # Core Invariants
//!
//! 1. **Bounded buffer**: at most `max_internal_queue_size` events are held;
//!    extra submissions are dropped, logged and completed with
//!    [`DeliveryError::Dropped`]
//! 2. **One flush in flight**: overlapping flush requests are no-ops
//! 3. **Exactly-once completion**: every accepted event's completion fires
//!    once with the outcome of the batch that carried it
//! 4. **Single active job**: the durable worker holds at most one job, so
//!    startup recovery can return it to the front of the queue
//!
//! # Architecture
//!
//! ```text
//! submit -> validate -> normalize -> buffer --(first event | flush_at | timer)--> flush
//!                                                                                  |
//!                      +-----------------------------------------------------------+
//!                      |                                      |
//!                 direct mode                           durable mode
//!           dispatcher + bounded retry        job store -> worker -> dispatcher
//!                                                 ^                    |
//!                                                 |__ requeue (front) _|
//! ```

pub mod buffer;
pub mod client;
pub mod completion;
pub mod config;
pub mod dispatcher;
mod durable;
pub mod error;
pub mod logging;
pub mod retry;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
mod tests;

pub use analytics_message::{LibraryInfo, MessageType, ValidationError};
pub use buffer::Batch;
pub use client::{Analytics, FlushOutcome};
pub use completion::{Completion, DeliveryResult};
pub use config::{ClientConfig, DirectRetryPolicy, DurableQueueOptions, JobOptions};
pub use dispatcher::{BatchPayload, DispatchRequest, Dispatcher};
pub use durable_job_queue::{InMemoryJobStore, JobStore, RedisConnectionOptions};
pub use error::{
    ConfigError, ConfigResult, DeliveryError, QueueSetupError, TransportErrorKind,
};
pub use logging::{init_logging, LogFormat, LogSettings};
pub use retry::{durable_backoff, is_retryable};
pub use scheduler::FlushState;
pub use transport::{HttpResponse, ReqwestTransport, Transport, TransportFailure};
