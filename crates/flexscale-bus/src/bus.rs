//! In-process message bus.
//!
//! One broadcast channel per topic, created lazily on first use.
//! Publishing never blocks; a topic with no subscribers drops the
//! payload, and a subscriber that falls behind loses the oldest
//! messages (the broadcast channel's lag semantics), which is the same
//! contract a broker client gives a slow consumer group.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Buffered messages per topic before a lagging subscriber loses data.
const TOPIC_CAPACITY: usize = 1024;

/// Handle to the process-wide message bus. Cheap to clone.
#[derive(Clone)]
pub struct MessageBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Bytes>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        let mut topics = self.topics.lock().expect("bus topic map poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(%topic, "bus topic created");
                broadcast::channel(TOPIC_CAPACITY).0
            })
            .clone()
    }

    /// Publish a framed payload on a topic.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, topic: &str, payload: Bytes) -> usize {
        let receivers = self.sender(topic).send(payload).unwrap_or(0);
        trace!(%topic, receivers, "published");
        receivers
    }

    /// Subscribe to a topic, receiving every payload published after
    /// this call.
    pub fn subscribe(&self, topic: &str) -> BusSubscription {
        BusSubscription {
            topic: topic.to_string(),
            rx: self.sender(topic).subscribe(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One consumer's position on a topic.
pub struct BusSubscription {
    topic: String,
    rx: broadcast::Receiver<Bytes>,
}

impl BusSubscription {
    /// Wait for the next payload.
    ///
    /// Returns `None` when the topic is gone (bus dropped). Lagged
    /// stretches are skipped with a log line; the consumer keeps going
    /// with the oldest retained message.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(topic = %self.topic, missed, "subscriber lagged, skipping");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_message, encode_message};
    use crate::messages::HttpMetric;
    use crate::topics;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(topics::HTTP_METRICS);

        let metric = HttpMetric {
            timestamp: 1_000,
            app_id: "app-1".to_string(),
            requests: 40,
            latency: 12,
            description: String::new(),
        };
        bus.publish(topics::HTTP_METRICS, encode_message(&metric).unwrap());

        let payload = sub.recv().await.unwrap();
        let decoded: HttpMetric = decode_message(&payload).unwrap();
        assert_eq!(decoded, metric);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let bus = MessageBus::new();
        assert_eq!(bus.publish(topics::SCALING_LOGS, Bytes::from_static(b"x")), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = MessageBus::new();
        let mut container_sub = bus.subscribe(topics::CONTAINER_METRICS);
        let mut http_sub = bus.subscribe(topics::HTTP_METRICS);

        bus.publish(topics::CONTAINER_METRICS, Bytes::from_static(b"container"));

        assert_eq!(
            container_sub.recv().await.unwrap(),
            Bytes::from_static(b"container")
        );
        // The other topic saw nothing.
        assert!(http_sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_message() {
        let bus = MessageBus::new();
        let mut first = bus.subscribe(topics::BINDING_EVENTS);
        let mut second = bus.subscribe(topics::BINDING_EVENTS);

        assert_eq!(bus.publish(topics::BINDING_EVENTS, Bytes::from_static(b"e")), 2);
        assert_eq!(first.recv().await.unwrap(), Bytes::from_static(b"e"));
        assert_eq!(second.recv().await.unwrap(), Bytes::from_static(b"e"));
    }
}
