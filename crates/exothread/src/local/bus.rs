//! # Event Bus
//!
//! Named topics fanning worker events out to subscribers. Each worker publishes
//! on its own topic (see [`WorkerId::topic`](crate::identity::WorkerId::topic)).
//!
//! Publishing holds the topic's map entry for the duration of the send, so events
//! on one topic reach every subscriber in publish order.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::registry::Payload;
use crate::registry::Subscription;

#[derive(Default)]
pub struct EventBus {
    topics: DashMap<String, Vec<mpsc::UnboundedSender<Payload>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to `topic`. The topic need not exist yet.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.entry(topic.to_string()).or_default().push(tx);
        Subscription::new(topic, rx)
    }

    /// Publishes to every live subscriber of `topic` and returns how many received it.
    ///
    /// Subscribers whose receiving end is gone are pruned.
    pub fn publish(&self, topic: &str, payload: Payload) -> usize {
        let Some(mut subscribers) = self.topics.get_mut(topic) else {
            return 0;
        };
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        subscribers.len()
    }

    /// Drops every subscriber of `topic`; their streams end.
    pub fn close(&self, topic: &str) {
        self.topics.remove(topic);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|subscribers| subscribers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("thread-1");
        let mut b = bus.subscribe("thread-1");
        let mut other = bus.subscribe("thread-2");

        assert_eq!(bus.publish("thread-1", Some(Message::from("one"))), 2);
        assert_eq!(bus.publish("thread-1", Some(Message::from("two"))), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(Some(Message::from("one"))));
            assert_eq!(sub.recv().await, Some(Some(Message::from("two"))));
        }

        bus.close("thread-2");
        assert_eq!(other.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("thread-3");
        assert_eq!(bus.subscriber_count("thread-3"), 1);

        drop(sub);
        assert_eq!(bus.publish("thread-3", None), 0);
        assert_eq!(bus.subscriber_count("thread-3"), 0);
        assert_eq!(bus.publish("nobody", None), 0);
    }
}
