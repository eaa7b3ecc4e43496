use crate::progress::ProgressMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Subscriber callback
///
/// Runs while the broker lock is held, so it must not block: push to a
/// bounded outbox or log and return. Returning an error unsubscribes it.
pub type Callback = Box<dyn FnMut(&ProgressMessage) -> anyhow::Result<()> + Send>;

/// Handle returned by `Broker::subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: u64,
    pub topic: String,
}

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// Topic-based fan-out of progress messages
///
/// Delivery is synchronous and in registration order. Topics exist only while
/// they have subscribers.
#[derive(Default)]
pub struct Broker {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a callback on a topic, creating the topic if needed
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: FnMut(&ProgressMessage) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.topics()
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                id,
                callback: Box::new(callback),
            });
        debug!("Subscriber {} joined {}", id, topic);

        Subscription {
            id,
            topic: topic.to_string(),
        }
    }

    /// Removes a subscription; the topic goes away with its last subscriber
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut topics = self.topics();
        if let Some(subscribers) = topics.get_mut(&subscription.topic) {
            subscribers.retain(|s| s.id != subscription.id);
            if subscribers.is_empty() {
                topics.remove(&subscription.topic);
            }
        }
    }

    /// Delivers a message to every subscriber of a topic
    ///
    /// Subscribers whose callback fails are dropped. Publishing to a topic
    /// without subscribers does nothing.
    pub fn publish(&self, topic: &str, message: &ProgressMessage) {
        let mut topics = self.topics();
        let Some(subscribers) = topics.get_mut(topic) else {
            return;
        };

        subscribers.retain_mut(|subscriber| match (subscriber.callback)(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping subscriber {} of {}: {}", subscriber.id, topic, e);
                false
            }
        });

        if subscribers.is_empty() {
            topics.remove(topic);
        }
    }

    /// Returns true while the topic has at least one subscriber
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics().contains_key(topic)
    }

    /// Number of subscribers currently registered on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics().get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let seen = Arc::clone(&seen);
            move |label: &str| -> Callback {
                let seen = Arc::clone(&seen);
                let label = label.to_string();
                Box::new(move |message: &ProgressMessage| {
                    seen.lock().unwrap().push(format!("{}:{:?}", label, message));
                    Ok(())
                })
            }
        };
        (seen, make)
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let broker = Broker::new();
        let (seen, make) = recorder();
        broker.subscribe("crawl-1", make("a"));
        broker.subscribe("crawl-1", make("b"));
        broker.subscribe("crawl-2", make("c"));

        broker.publish("crawl-1", &ProgressMessage::CrawlEnd(1));
        broker.publish("crawl-1", &ProgressMessage::CrawlEnd(2));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "a:CrawlEnd(1)".to_string(),
                "b:CrawlEnd(1)".to_string(),
                "a:CrawlEnd(2)".to_string(),
                "b:CrawlEnd(2)".to_string(),
            ]
        );
    }

    #[test]
    fn test_failing_subscriber_is_removed() {
        let broker = Broker::new();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        broker.subscribe("crawl-1", move |_: &ProgressMessage| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("outbox closed")
        });
        let (seen, make) = recorder();
        broker.subscribe("crawl-1", make("ok"));

        broker.publish("crawl-1", &ProgressMessage::IssuesInit);
        broker.publish("crawl-1", &ProgressMessage::IssuesInit);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(broker.subscriber_count("crawl-1"), 1);
    }

    #[test]
    fn test_topic_removed_with_last_subscriber() {
        let broker = Broker::new();
        let (seen, make) = recorder();
        let subscription = broker.subscribe("crawl-1", make("a"));
        assert!(broker.has_topic("crawl-1"));

        broker.unsubscribe(&subscription);
        assert!(!broker.has_topic("crawl-1"));

        broker.publish("crawl-1", &ProgressMessage::IssuesInit);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_topic_removed_when_last_subscriber_fails() {
        let broker = Broker::new();
        broker.subscribe("crawl-1", |_: &ProgressMessage| anyhow::bail!("gone"));
        broker.publish("crawl-1", &ProgressMessage::IssuesInit);
        assert!(!broker.has_topic("crawl-1"));
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let broker = Broker::new();
        broker.unsubscribe(&Subscription {
            id: 99,
            topic: "nothing".to_string(),
        });
        assert!(!broker.has_topic("nothing"));
    }
}
