//! Topic
//!
//! A `Topic` is a named broadcast channel plus the number of subscriptions
//! currently holding it. Every subscription gets its own bounded receiver on
//! the channel, so a publish reaches every subscriber rather than one of them.
//!
//! The subscriber count is only changed by the [`Registry`](super::registry::Registry)
//! while it holds its exclusive lock.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct Topic {
    name: String,
    subscribers: AtomicUsize,
    sender: broadcast::Sender<Bytes>,
}

impl Topic {
    /// Create a topic whose subscriptions each buffer up to `capacity` messages.
    pub fn new(name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.to_string(),
            subscribers: AtomicUsize::new(0),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) -> usize {
        self.subscribers.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Saturates at zero so an unbalanced release cannot wrap the count.
    pub(crate) fn decrement(&self) -> usize {
        let previous = self
            .subscribers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub(crate) fn receiver(&self) -> broadcast::Receiver<Bytes> {
        self.sender.subscribe()
    }

    /// Hands `payload` to every live receiver and returns how many there were.
    pub(crate) fn broadcast(&self, payload: Bytes) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }
}
