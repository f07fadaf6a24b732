//! The broker contains the topic registry and the publish/subscribe engine.
//!
//! Public types:
//! - `Broker`: owns the registry and implements publish and subscribe.
//! - `Registry`: the concurrent `name -> Topic` mapping.
//! - `Subscription`: a retained topic plus its message receiver.

pub mod engine;
pub mod registry;
pub mod topic;

pub use engine::Broker;
pub use registry::{Registry, Subscription, TopicLease};
pub use topic::Topic;

#[cfg(test)]
mod tests;
