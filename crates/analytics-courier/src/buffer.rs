//! Bounded in-memory buffer of normalized events.

use crate::completion::{Completion, QueueItem};
use analytics_message::Event;
use serde_json::Value;
use std::collections::VecDeque;

/// Events cut from the buffer for one delivery cycle.
///
/// Each event carries a `sentAt` stamped at cut time.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub events: Vec<Event>,
    pub sent_at: String,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// FIFO buffer with a hard ceiling.
#[derive(Debug)]
pub(crate) struct InternalBuffer {
    items: VecDeque<QueueItem>,
    capacity: usize,
}

impl InternalBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Append an item, returning the new length. A full buffer hands the
    /// item back untouched.
    pub fn push(&mut self, item: QueueItem) -> Result<usize, QueueItem> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Remove up to `max` items from the front.
    pub fn cut(&mut self, max: usize) -> Option<(Batch, Vec<Completion>)> {
        if self.items.is_empty() {
            return None;
        }

        let sent_at = crate::dispatcher::timestamp_now();
        let take = max.min(self.items.len());
        let mut events = Vec::with_capacity(take);
        let mut completions = Vec::with_capacity(take);
        for QueueItem {
            mut event,
            completion,
        } in self.items.drain(..take)
        {
            event.insert("sentAt".to_string(), Value::String(sent_at.clone()));
            events.push(event);
            completions.push(completion);
        }

        Some((Batch { events, sent_at }, completions))
    }

    /// Put a cut batch back at the front, preserving its order.
    pub fn restore_front(&mut self, events: Vec<Event>, completions: Vec<Completion>) {
        for (event, completion) in events.into_iter().zip(completions).rev() {
            self.items.push_front(QueueItem { event, completion });
        }
    }
}
