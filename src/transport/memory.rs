use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{BroadcastTransport, TransportError, SUBSCRIPTION_BUFFER};

/// Process-local broker. Several distributors sharing one instance behave
/// like several processes sharing a Redis server.
pub struct InMemoryBroker {
    topics: DashMap<String, Vec<mpsc::Sender<Vec<u8>>>>,
    available: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable, `publish` fails as an unreachable broker would.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastTransport for InMemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("in-memory broker is down".to_string()));
        }

        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|tx| match tx.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(topic = %topic, "Subscriber buffer full, message dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.topics.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe("t").await.unwrap();
        let mut b = broker.subscribe("t").await.unwrap();
        let mut other = broker.subscribe("other").await.unwrap();

        broker.publish("t", b"hello".to_vec()).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap(), b"hello");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let broker = InMemoryBroker::new();
        let rx = broker.subscribe("t").await.unwrap();
        assert_eq!(broker.subscriber_count("t"), 1);

        drop(rx);
        broker.publish("t", vec![1]).await.unwrap();
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_publish() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);
        tokio_test::assert_err!(broker.publish("t", vec![1]).await);

        broker.set_available(true);
        tokio_test::assert_ok!(broker.publish("t", vec![1]).await);
    }
}
