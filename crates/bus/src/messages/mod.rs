//! Payload types carried inside [`Message`](crate::Message) envelopes.

pub mod queue;
pub mod response;
pub mod retry;

pub use queue::{QueueChange, QueueEntry, QueueSnapshot};
pub use response::SkillResponse;
pub use retry::PreconditionRetry;
