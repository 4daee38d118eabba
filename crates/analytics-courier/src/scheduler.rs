//! Flush scheduling state: the in-flight token and the periodic timer.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Whether a flush cycle currently owns the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Running,
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct FlushScheduler {
    state: AtomicU8,
    first_enqueue_seen: AtomicBool,
    generation: AtomicU64,
    timer: Mutex<Option<ArmedTimer>>,
}

/// Holds the `Running` token; dropping it returns the scheduler to `Idle`,
/// even when the cycle's future is abandoned mid-flight.
pub(crate) struct FlushGuard<'a> {
    scheduler: &'a FlushScheduler,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.state.store(IDLE, Ordering::Release);
    }
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            first_enqueue_seen: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> FlushState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => FlushState::Running,
            _ => FlushState::Idle,
        }
    }

    /// Idle → Running. `None` when a cycle is already in flight.
    pub fn try_begin(&self) -> Option<FlushGuard<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlushGuard { scheduler: self })
    }

    /// True exactly once: for the first enqueue over the scheduler's life.
    pub fn claim_first_enqueue(&self) -> bool {
        !self.first_enqueue_seen.swap(true, Ordering::AcqRel)
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Arm the periodic timer unless one is already pending.
    ///
    /// `fire` receives the timer's generation and must call [`Self::disarm`]
    /// with it before flushing; a stale generation means the timer was
    /// replaced or cancelled and must not flush.
    pub fn arm<F, Fut>(&self, runtime: &Handle, delay: Duration, fire: F) -> bool
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.timer.lock();
        if slot.is_some() {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let fired = fire(generation);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fired.await;
        });
        *slot = Some(ArmedTimer { generation, handle });
        true
    }

    /// Claim an elapsed timer. Leaves the task running (it is the caller).
    pub fn disarm(&self, generation: u64) -> bool {
        let mut slot = self.timer.lock();
        match slot.as_ref() {
            Some(armed) if armed.generation == generation => {
                slot.take();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_timer(&self) {
        if let Some(armed) = self.timer.lock().take() {
            armed.handle.abort();
        }
    }
}
