//! Durable job queue: an at-least-once job store for delivery retries.
//!
//! A job moves through three lists:
//!
//! ```text
//!  push(Back)  ──▶ ┌──────┐   next()   ┌────────┐  complete()  ──▶ (gone)
//!  push(Front) ──▶ │ wait │ ─────────▶ │ active │
//!                  └──────┘            └────────┘  fail()      ──▶ failed
//! ```
//!
//! `next()` moves exactly one job from `wait` to `active`; a process that
//! dies while holding a job leaves it in `active`, where the next startup
//! finds it with [`JobStore::list_active`].
//!
//! Persisted payloads are plain JSON produced by [`JobRecord::encode`];
//! decoding is strict (versioned, unknown fields rejected).

mod error;
mod memory;
mod record;
mod redis_store;
mod store;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryJobStore;
pub use record::{JobRecord, JOB_FORMAT_VERSION};
pub use redis_store::{QueueKeys, RedisConnectionOptions, RedisJobStore};
pub use store::{ActiveJob, FailedJob, JobCounts, JobStore, Placement};
