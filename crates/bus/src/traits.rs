use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::Message;

/// Fire-and-forget topic publisher.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), BusError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        (**self).publish(message).await
    }
}

/// Topic-prefix subscriber.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Add a prefix filter. An empty prefix matches every topic.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError>;

    /// Drop a previously added prefix filter.
    async fn unsubscribe(&self, topic_prefix: &str) -> Result<(), BusError>;

    /// Wait for the next message matching a filter.
    async fn recv(&self) -> Result<Message, BusError>;
}

#[async_trait]
impl<T: EventSubscriber + ?Sized> EventSubscriber for Arc<T> {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        (**self).subscribe(topic_prefix).await
    }

    async fn unsubscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        (**self).unsubscribe(topic_prefix).await
    }

    async fn recv(&self) -> Result<Message, BusError> {
        (**self).recv().await
    }
}
