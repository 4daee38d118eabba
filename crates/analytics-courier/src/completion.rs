//! Per-submission completion handles.

use crate::error::DeliveryError;
use analytics_message::Event;
use std::fmt;
use tokio::sync::oneshot;

/// Final outcome of one submitted event.
pub type DeliveryResult = Result<(), DeliveryError>;

/// A continuation invoked exactly once with the outcome of the batch that
/// carried the event.
///
/// Consuming `complete` makes double invocation impossible. A completion
/// dropped without being called (client dropped with events still buffered)
/// never fires; a [`Completion::channel`] receiver then sees a closed channel.
pub struct Completion {
    callback: Box<dyn FnOnce(DeliveryResult) + Send + 'static>,
}

impl Completion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(DeliveryResult) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// A completion paired with a receiver for awaiting the outcome.
    pub fn channel() -> (Self, oneshot::Receiver<DeliveryResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    pub fn complete(self, result: DeliveryResult) {
        (self.callback)(result)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Resolve every completion of a batch, in submission order.
pub(crate) fn complete_all(completions: Vec<Completion>, result: &DeliveryResult) {
    for completion in completions {
        completion.complete(result.clone());
    }
}

/// A normalized event waiting in the buffer.
#[derive(Debug)]
pub(crate) struct QueueItem {
    pub event: Event,
    pub completion: Completion,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channel_receives_outcome() {
        let (completion, rx) = Completion::channel();
        completion.complete(Err(DeliveryError::Abandoned { attempts: 10 }));
        assert_eq!(
            rx.await.unwrap(),
            Err(DeliveryError::Abandoned { attempts: 10 })
        );
    }

    #[test]
    fn test_complete_all_invokes_each_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let completions = (0..3)
            .map(|_| {
                let calls = calls.clone();
                Completion::new(move |result| {
                    assert!(result.is_ok());
                    calls.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        complete_all(completions, &Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
