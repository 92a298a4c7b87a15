use std::sync::Arc;

use chrono::Utc;
use floorline_bus::{
    EventPublisher, Frame, Message, MessageCategory, Participant, QueueChange, QueueEntry,
    QueueSnapshot,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::RequestEnvelope;
use crate::queue::ExecutionQueue;

/// Publishes the queue after every mutation to the module's action-queue topic.
///
/// Telemetry only: publish failures are logged and swallowed.
pub struct StateBroadcaster {
    module_id: String,
    sender: Participant,
    topic: String,
    queue: Arc<ExecutionQueue>,
    publisher: Arc<dyn EventPublisher>,
}

impl StateBroadcaster {
    pub fn new(
        module_id: impl Into<String>,
        sender: Participant,
        topic: impl Into<String>,
        queue: Arc<ExecutionQueue>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            sender,
            topic: topic.into(),
            queue,
            publisher,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Build the snapshot for the current queue contents.
    pub fn snapshot(&self, reason: QueueChange, changed_conversation_id: &str) -> QueueSnapshot {
        build_snapshot(
            &self.module_id,
            reason,
            changed_conversation_id,
            &self.queue.snapshot(),
        )
    }

    pub async fn publish(&self, reason: QueueChange, changed_conversation_id: &str) {
        let snapshot = self.snapshot(reason, changed_conversation_id);
        let entries = snapshot.entries.len();
        // Broadcasts get a throwaway conversation id.
        let frame = Frame {
            category: MessageCategory::Inform,
            conversation_id: Uuid::new_v4().to_string(),
            sender: self.sender.clone(),
            receiver: Participant::new("broadcast", ""),
        };

        let message = match Message::framed(self.topic.clone(), frame, &snapshot) {
            Ok(m) => m,
            Err(e) => {
                warn!(reason = %reason, error = %e, "failed to encode queue snapshot");
                return;
            }
        };
        match self.publisher.publish(message).await {
            Ok(()) => debug!(reason = %reason, conversation_id = %changed_conversation_id, entries, "queue snapshot published"),
            Err(e) => warn!(reason = %reason, error = %e, "failed to publish queue snapshot"),
        }
    }
}

/// Positional snapshot of `envelopes` in queue order.
pub fn build_snapshot(
    module_id: &str,
    reason: QueueChange,
    changed_conversation_id: &str,
    envelopes: &[RequestEnvelope],
) -> QueueSnapshot {
    let entries = envelopes
        .iter()
        .enumerate()
        .map(|(position, envelope)| QueueEntry {
            queue_position: position,
            conversation_id: envelope.conversation_id.clone(),
            action_title: envelope.action_title.clone(),
            action_state: envelope.queue_state(),
            enqueued_at_utc: envelope.enqueued_at(),
            scheduled_at_utc: envelope.scheduled_at(),
            started_at_utc: envelope.started_at(),
        })
        .collect();

    QueueSnapshot {
        module_id: module_id.to_string(),
        reason,
        changed_conversation_id: changed_conversation_id.to_string(),
        timestamp_utc: Utc::now(),
        entries,
    }
}
