use super::Broker;
use super::engine::unique_topics;
use super::registry::Registry;
use super::topic::Topic;
use crate::config::BrokerSettings;
use crate::utils::error::ProblemKind;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn broker_with_capacity(topic_capacity: usize) -> Broker {
    Broker::new(BrokerSettings {
        topic_capacity,
        ..BrokerSettings::default()
    })
}

#[test]
fn test_topic_new() {
    let topic = Topic::new("test_topic", 4);
    assert_eq!(topic.name(), "test_topic");
    assert_eq!(topic.subscriber_count(), 0);
}

#[test]
fn test_topic_zero_capacity_is_clamped() {
    // broadcast::channel panics on zero capacity
    let topic = Topic::new("t", 0);
    let mut rx = topic.receiver();
    assert_eq!(topic.broadcast(Bytes::from_static(b"x")), 1);
    assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"x"));
}

#[test]
fn test_topic_decrement_saturates() {
    let topic = Topic::new("t", 1);
    assert_eq!(topic.decrement(), 0);
    assert_eq!(topic.increment(), 1);
    assert_eq!(topic.decrement(), 0);
}

#[test]
fn test_get_or_create_returns_same_topic() {
    let registry = Registry::new(4);
    let a = registry.get_or_create("a");
    let b = registry.get_or_create("a");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_lookup_never_creates() {
    let registry = Registry::new(4);
    assert!(registry.lookup("a").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_lookup_ignores_topics_without_subscribers() {
    let registry = Registry::new(4);
    registry.get_or_create("a");
    assert!(registry.contains("a"));
    assert!(registry.lookup("a").is_none());
}

#[test]
fn test_retain_and_release_lifecycle() {
    let registry = Registry::new(4);
    let topic = registry.get_or_create("a");

    registry.retain(&topic);
    registry.retain(&topic);
    assert_eq!(registry.subscriber_count("a"), 2);
    assert!(registry.lookup("a").is_some());

    registry.release(&topic);
    assert_eq!(registry.subscriber_count("a"), 1);
    assert!(registry.contains("a"));

    registry.release(&topic);
    assert!(!registry.contains("a"));
    assert!(registry.lookup("a").is_none());
}

#[test]
fn test_release_drops_unretained_topic() {
    let registry = Registry::new(4);
    let topic = registry.get_or_create("a");
    assert!(registry.contains("a"));

    registry.release(&topic);
    assert_eq!(topic.subscriber_count(), 0);
    assert!(!registry.contains("a"));
    assert!(registry.is_empty());
}

#[test]
fn test_retain_relinks_evicted_topic() {
    let registry = Registry::new(4);
    let topic = registry.get_or_create("a");
    registry.retain(&topic);
    registry.release(&topic);
    assert!(!registry.contains("a"));

    registry.retain(&topic);
    let found = registry.lookup("a").expect("topic relinked");
    assert!(Arc::ptr_eq(&found, &topic));
}

#[test]
fn test_release_of_stale_topic_keeps_new_one() {
    let registry = Arc::new(Registry::new(4));
    let stale = registry.get_or_create("a");
    registry.retain(&stale);
    registry.release(&stale);

    let fresh = registry.acquire("a");
    assert!(!Arc::ptr_eq(fresh.topic(), &stale));

    // a late, unbalanced release on the old instance must not evict the new one
    registry.release(&stale);
    assert!(registry.lookup("a").is_some());
}

#[test]
fn test_subscription_drop_releases_topic() {
    let registry = Arc::new(Registry::new(4));
    let first = registry.acquire("a");
    let second = registry.acquire("a");
    assert!(Arc::ptr_eq(first.topic(), second.topic()));
    assert_eq!(registry.subscriber_count("a"), 2);

    drop(first);
    assert_eq!(registry.subscriber_count("a"), 1);

    drop(second);
    assert!(registry.lookup("a").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_topic_names_are_sorted() {
    let registry = Arc::new(Registry::new(4));
    let _b = registry.acquire("b");
    let _a = registry.acquire("a");
    assert_eq!(registry.topic_names(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_publish_to_nonexistent_topic() {
    let broker = Broker::default();
    let err = broker
        .publish("missing", Bytes::from_static(b"hello"))
        .unwrap_err();
    assert_eq!(err.kind, ProblemKind::TopicDoesNotExist);
    assert!(broker.registry().is_empty());
}

#[test]
fn test_publish_after_last_subscriber_left() {
    let broker = Broker::default();
    let subscriptions = broker.subscribe(&["a"]);
    assert!(broker.publish("a", Bytes::from_static(b"1")).is_ok());

    drop(subscriptions);
    let err = broker.publish("a", Bytes::from_static(b"2")).unwrap_err();
    assert_eq!(err.kind, ProblemKind::TopicDoesNotExist);
}

#[tokio::test]
async fn test_publish_delivers_in_order() {
    let broker = Broker::default();
    let mut subscriptions = broker.subscribe(&["a"]);
    let sub = &mut subscriptions[0];

    for payload in ["one", "two", "three"] {
        assert_eq!(broker.publish("a", Bytes::from(payload)).unwrap(), 1);
    }

    assert_eq!(sub.recv().await.unwrap(), Bytes::from("one"));
    assert_eq!(sub.recv().await.unwrap(), Bytes::from("two"));
    assert_eq!(sub.recv().await.unwrap(), Bytes::from("three"));
}

#[tokio::test]
async fn test_publish_reaches_every_subscriber() {
    let broker = Broker::default();
    let mut first = broker.subscribe(&["a"]);
    let mut second = broker.subscribe(&["a"]);

    assert_eq!(broker.publish("a", Bytes::from_static(b"m")).unwrap(), 2);

    assert_eq!(first[0].recv().await.unwrap(), Bytes::from_static(b"m"));
    assert_eq!(second[0].recv().await.unwrap(), Bytes::from_static(b"m"));
}

#[tokio::test]
async fn test_slow_subscriber_drops_oldest() {
    let broker = broker_with_capacity(2);
    let mut subscriptions = broker.subscribe(&["a"]);
    let sub = &mut subscriptions[0];

    for payload in ["1", "2", "3"] {
        broker.publish("a", Bytes::from(payload)).unwrap();
    }

    assert!(matches!(sub.recv().await, Err(RecvError::Lagged(1))));
    assert_eq!(sub.recv().await.unwrap(), Bytes::from("2"));
    assert_eq!(sub.recv().await.unwrap(), Bytes::from("3"));
}

#[test]
fn test_subscribe_collapses_duplicates() {
    let broker = Broker::default();
    let subscriptions = broker.subscribe(&["a", "b", "a"]);
    let names: Vec<&str> = subscriptions.iter().map(|s| s.topic().name()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(broker.registry().subscriber_count("a"), 1);
}

#[test]
fn test_unique_topics_keeps_first_seen_order() {
    assert_eq!(unique_topics(&["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
    assert!(unique_topics::<&str>(&[]).is_empty());
}

#[test]
fn test_concurrent_acquire_and_release_leaves_registry_empty() {
    let registry = Arc::new(Registry::new(4));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let sub = registry.acquire("shared");
                    assert!(registry.lookup("shared").is_some());
                    drop(sub);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(registry.is_empty());
}
