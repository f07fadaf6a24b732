//! Broker engine
//!
//! The broker owns the topic registry for the lifetime of the process and
//! exposes the two operations the protocol offers:
//!
//! - `publish` hands a payload to every current subscriber of an existing
//!   topic. It never creates topics and never blocks: each subscription has a
//!   bounded queue and a subscriber that falls behind loses its oldest
//!   messages.
//! - `subscribe` retains a set of topics (creating them on demand) and
//!   returns one [`Subscription`] per unique topic name. Dropping a
//!   subscription releases its topic.
//!
//! The broker is shared between connection tasks as `Arc<Broker>`; all
//! synchronization lives inside the registry.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::broker::registry::{Registry, Subscription};
use crate::config::BrokerSettings;
use crate::utils::error::Problem;

#[derive(Debug)]
pub struct Broker {
    registry: Arc<Registry>,
    settings: BrokerSettings,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            registry: Arc::new(Registry::new(settings.topic_capacity)),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Publishes `payload` to `topic` and returns how many subscriptions it was handed to.
    pub fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, Problem> {
        let topic = self
            .registry
            .lookup(topic)
            .ok_or_else(|| Problem::topic_does_not_exist(topic))?;

        let subscribers = topic.subscriber_count();
        let delivered = topic.broadcast(payload);
        debug!(
            topic = topic.name(),
            subscribers, delivered, "message published"
        );
        Ok(delivered)
    }

    /// Subscribes to every unique name in `topics`, in first-seen order.
    pub fn subscribe<S: AsRef<str>>(&self, topics: &[S]) -> Vec<Subscription> {
        unique_topics(topics)
            .into_iter()
            .map(|name| self.registry.acquire(name))
            .collect()
    }
}

/// Removes repeated names while keeping the order they first appeared in.
pub fn unique_topics<S: AsRef<str>>(topics: &[S]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(topics.len());
    for topic in topics {
        let topic = topic.as_ref();
        if !unique.contains(&topic) {
            unique.push(topic);
        }
    }
    unique
}
