//! Scenario tests for the courier.
//!
//! - `harness.rs`  - scripted transport and wait helpers
//! - `disabled.rs` - disabled client completes inline, sends nothing
//! - `buffering.rs` - buffer ceiling, flush triggers, batch cutting, ordering
//! - `dispatch.rs` - direct-mode retries and error classification
//! - `durable.rs`  - durable queue activation, recovery, backoff and dead letters

mod buffering;
mod disabled;
