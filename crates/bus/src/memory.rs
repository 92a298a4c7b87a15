//! In-process bus over `tokio::sync::broadcast`.
//!
//! Same prefix-filter semantics as the ZeroMQ sockets: a subscriber with no
//! filters receives nothing. Used by embedded agents and tests.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};

const DEFAULT_CAPACITY: usize = 1024;

/// Shared hub; hand out publishers and subscribers from it.
#[derive(Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<Message>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            sender: self.sender.clone(),
        }
    }

    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            receiver: tokio::sync::Mutex::new(self.sender.subscribe()),
            prefixes: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Clone)]
pub struct MemoryPublisher {
    sender: broadcast::Sender<Message>,
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let topic = message.topic.clone();
        // No live subscriber is not an error on a pub/sub bus.
        match self.sender.send(message) {
            Ok(receivers) => debug!(topic = %topic, receivers, "published"),
            Err(_) => debug!(topic = %topic, "published with no subscribers"),
        }
        Ok(())
    }
}

pub struct MemorySubscriber {
    receiver: tokio::sync::Mutex<broadcast::Receiver<Message>>,
    prefixes: Mutex<Vec<String>>,
}

impl MemorySubscriber {
    fn matches(&self, topic: &str) -> bool {
        self.prefixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| topic.starts_with(p.as_str()))
    }
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        let mut prefixes = self.prefixes.lock().unwrap_or_else(PoisonError::into_inner);
        if !prefixes.iter().any(|p| p == topic_prefix) {
            prefixes.push(topic_prefix.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        self.prefixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| p != topic_prefix);
        Ok(())
    }

    async fn recv(&self) -> Result<Message, BusError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(message) if self.matches(&message.topic) => return Ok(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "in-memory subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscriber_only_sees_matching_prefix() {
        let bus = InMemoryBus::default();
        let publisher = bus.publisher();
        let subscriber = bus.subscriber();
        subscriber.subscribe("/Lab/P102/").await.unwrap();

        publisher
            .publish(Message::new("/Lab/P200/x", &1u8).unwrap())
            .await
            .unwrap();
        publisher
            .publish(Message::new("/Lab/P102/x", &2u8).unwrap())
            .await
            .unwrap();

        let received = subscriber.recv().await.unwrap();
        assert_eq!(received.topic, "/Lab/P102/x");
        assert_eq!(received.decode::<u8>().unwrap(), 2);
    }

    #[tokio::test]
    async fn unsubscribed_prefix_is_filtered() {
        let bus = InMemoryBus::default();
        let publisher = bus.publisher();
        let subscriber = bus.subscriber();
        subscriber.subscribe("a/").await.unwrap();
        subscriber.unsubscribe("a/").await.unwrap();

        publisher.publish(Message::new("a/1", &()).unwrap()).await.unwrap();

        let res = tokio::time::timeout(Duration::from_millis(50), subscriber.recv()).await;
        assert!(res.is_err(), "no filters means no delivery");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::new(4);
        bus.publisher()
            .publish(Message::new("t", &()).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recv_reports_closed_bus() {
        let bus = InMemoryBus::new(4);
        let subscriber = bus.subscriber();
        subscriber.subscribe("").await.unwrap();
        drop(bus);
        assert!(matches!(subscriber.recv().await, Err(BusError::Closed)));
    }
}
