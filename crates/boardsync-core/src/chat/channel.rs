//! Local publish/subscribe bus shared by the tabs of one process.
//!
//! Topic string to subscriber list, with multi-subscriber delivery and no
//! cross-process guarantee. Each topic is a `tokio::sync::broadcast`
//! channel created on first use; a publisher that is also subscribed sees
//! its own messages.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{trace, warn};

use crate::model::ChatMessage;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast topic for a chat thread.
#[must_use]
pub fn channel_name(thread_id: &str) -> String {
    format!("chat-{thread_id}")
}

#[derive(Clone)]
pub struct LocalBus {
    topics: Rc<RefCell<HashMap<String, broadcast::Sender<ChatMessage>>>>,
    capacity: usize,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LocalBus {
    /// A bus whose topics buffer up to `capacity` undelivered messages per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Rc::new(RefCell::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<ChatMessage> {
        self.topics
            .borrow_mut()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        trace!(topic, "subscribed");
        Subscription {
            topic: topic.to_string(),
            rx: Some(self.sender(topic).subscribe()),
        }
    }

    /// Deliver `message` to every open subscription of `topic`. Returns the
    /// number of subscribers reached.
    pub fn publish(&self, topic: &str, message: ChatMessage) -> usize {
        self.sender(topic).send(message).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .borrow()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// One open subscription to a bus topic.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: Option<broadcast::Receiver<ChatMessage>>,
}

impl Subscription {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    /// Next buffered message, if any. Never waits.
    pub fn try_next(&mut self) -> Option<ChatMessage> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "chat subscriber lagged; messages dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving. Safe to call more than once.
    pub fn close(&mut self) {
        if self.rx.take().is_some() {
            trace!(topic = %self.topic, "unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalBus, channel_name};
    use crate::model::{ChatMessage, Identity};
    use chrono::Utc;
    use uuid::Uuid;

    fn message(text: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            thread_id: "p1".into(),
            sender: Identity::parse("a@x.com").expect("identity"),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn topic_name_is_prefixed() {
        assert_eq!(channel_name("p1"), "chat-p1");
    }

    #[test]
    fn every_subscriber_receives_in_order() {
        let bus = LocalBus::default();
        let mut first = bus.subscribe("chat-p1");
        let mut second = bus.clone().subscribe("chat-p1");

        assert_eq!(bus.publish("chat-p1", message("one")), 2);
        bus.publish("chat-p1", message("two"));

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.try_next().expect("first").text, "one");
            assert_eq!(sub.try_next().expect("second").text, "two");
            assert!(sub.try_next().is_none());
        }
    }

    #[test]
    fn topics_are_isolated() {
        let bus = LocalBus::default();
        let mut other = bus.subscribe("chat-p2");
        bus.publish("chat-p1", message("hi"));
        assert!(other.try_next().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let bus = LocalBus::default();
        let mut sub = bus.subscribe("chat-p1");
        assert_eq!(bus.subscriber_count("chat-p1"), 1);
        sub.close();
        sub.close();
        assert!(!sub.is_open());
        assert_eq!(bus.subscriber_count("chat-p1"), 0);
        assert_eq!(bus.publish("chat-p1", message("late")), 0);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn lagging_subscriber_skips_to_oldest_retained() {
        let bus = LocalBus::new(2);
        let mut sub = bus.subscribe("t");
        for text in ["a", "b", "c"] {
            bus.publish("t", message(text));
        }
        assert_eq!(sub.try_next().expect("retained").text, "b");
        assert_eq!(sub.try_next().expect("retained").text, "c");
    }
}
