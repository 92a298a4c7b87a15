//! Messaging layer for module execution agents.
//!
//! A [`Message`] envelope carries a MessagePack payload plus the protocol
//! frame (category, conversation, sender, receiver). Publishers and
//! subscribers are trait objects so the scheduler can run against ZeroMQ in
//! production and against [`InMemoryBus`] in tests.

pub mod error;
pub mod memory;
pub mod message;
pub mod messages;
pub mod pubsub;
pub mod topics;
pub mod traits;
pub mod transport;

pub use error::BusError;
pub use memory::{InMemoryBus, MemoryPublisher, MemorySubscriber};
pub use message::{Frame, Message, MessageCategory, Participant};
pub use messages::{PreconditionRetry, QueueChange, QueueEntry, QueueSnapshot, SkillResponse};
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use topics::TopicScheme;
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
