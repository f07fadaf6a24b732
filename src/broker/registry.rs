//! Topic registry
//!
//! The registry owns the `name -> Topic` mapping behind a single `RwLock`.
//! Lookups take the shared lock; creation and subscriber-count changes take
//! the exclusive lock. Critical sections only touch the map and the counts,
//! never a channel or a socket.
//!
//! A topic lives in the map exactly as long as its subscriber count is above
//! zero. Removing a topic from the map does not destroy it: subscriptions and
//! in-flight publishes may still hold an `Arc<Topic>`, but later lookups will
//! not find it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::debug;

use crate::broker::topic::Topic;

#[derive(Debug)]
pub struct Registry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    topic_capacity: usize,
}

impl Registry {
    pub fn new(topic_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            topic_capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Topic>>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Topic>>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the topic called `name`, creating it with no subscribers if needed.
    ///
    /// A created topic sits in the map with a count of zero until the caller
    /// follows up with [`retain`](Self::retain), or with
    /// [`release`](Self::release) to drop the empty entry. Subscribers should
    /// use [`acquire`](Self::acquire), which does both steps under one lock.
    pub fn get_or_create(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.write();
        Self::entry(&mut topics, name, self.topic_capacity).clone()
    }

    fn entry<'a>(
        topics: &'a mut HashMap<String, Arc<Topic>>,
        name: &str,
        capacity: usize,
    ) -> &'a Arc<Topic> {
        topics.entry(name.to_string()).or_insert_with(|| {
            debug!(topic = name, "topic created");
            Arc::new(Topic::new(name, capacity))
        })
    }

    /// Returns the topic called `name` if it currently has subscribers. Never creates.
    pub fn lookup(&self, name: &str) -> Option<Arc<Topic>> {
        self.read()
            .get(name)
            .filter(|topic| topic.subscriber_count() > 0)
            .cloned()
    }

    /// Adds one subscriber to `topic`.
    ///
    /// If the topic had already been evicted and nothing else has taken its
    /// name, it is put back into the map.
    pub fn retain(&self, topic: &Arc<Topic>) {
        let mut topics = self.write();
        let count = topic.increment();
        if let Entry::Vacant(slot) = topics.entry(topic.name().to_string()) {
            slot.insert(topic.clone());
        }
        debug!(topic = topic.name(), subscribers = count, "topic retained");
    }

    /// Removes one subscriber from `topic`, evicting it once none are left.
    pub fn release(&self, topic: &Arc<Topic>) {
        let mut topics = self.write();
        let count = topic.decrement();
        if count == 0 {
            // only evict the instance we were handed; the name may have been reused
            if topics
                .get(topic.name())
                .is_some_and(|current| Arc::ptr_eq(current, topic))
            {
                topics.remove(topic.name());
                debug!(topic = topic.name(), "topic removed");
            }
        } else {
            debug!(topic = topic.name(), subscribers = count, "topic released");
        }
    }

    /// Creates (if needed) and retains `name`, and opens a receiver on it,
    /// all under one exclusive lock.
    pub fn acquire(self: &Arc<Self>, name: &str) -> Subscription {
        let mut topics = self.write();
        let topic = Self::entry(&mut topics, name, self.topic_capacity).clone();
        let count = topic.increment();
        let receiver = topic.receiver();
        drop(topics);

        debug!(topic = name, subscribers = count, "topic acquired");
        Subscription {
            lease: TopicLease {
                registry: Arc::clone(self),
                topic,
            },
            receiver,
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.read()
            .get(name)
            .map_or(0, |topic| topic.subscriber_count())
    }

    /// Whether `name` is in the map, with or without subscribers.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Names currently in the map, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// One retained reference to a topic. Dropping it releases the topic.
#[derive(Debug)]
pub struct TopicLease {
    registry: Arc<Registry>,
    topic: Arc<Topic>,
}

impl TopicLease {
    pub fn topic(&self) -> &Arc<Topic> {
        &self.topic
    }
}

impl Drop for TopicLease {
    fn drop(&mut self) {
        self.registry.release(&self.topic);
    }
}

/// A lease on a topic together with this subscriber's own receiver.
#[derive(Debug)]
pub struct Subscription {
    lease: TopicLease,
    receiver: broadcast::Receiver<Bytes>,
}

impl Subscription {
    pub fn topic(&self) -> &Arc<Topic> {
        self.lease.topic()
    }

    /// Next message on the topic. `RecvError::Lagged` means older messages
    /// were dropped because this subscriber fell behind.
    pub async fn recv(&mut self) -> Result<Bytes, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Splits the subscription so the receiver can move into a listener task
    /// while the caller keeps the lease.
    pub fn into_parts(self) -> (TopicLease, broadcast::Receiver<Bytes>) {
        (self.lease, self.receiver)
    }
}
