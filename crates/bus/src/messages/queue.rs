use std::fmt;

use chrono::{DateTime, Utc};
use floorline_core::QueueState;
use serde::{Deserialize, Serialize};

/// The queue mutation that triggered a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueChange {
    Enqueue,
    Start,
    Requeue,
    Remove,
}

impl QueueChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Start => "start",
            Self::Requeue => "requeue",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for QueueChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued request as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Zero-based position in arrival order.
    pub queue_position: usize,
    pub conversation_id: String,
    pub action_title: String,
    pub action_state: QueueState,
    pub enqueued_at_utc: DateTime<Utc>,
    /// Start time if started, otherwise the enqueue time.
    pub scheduled_at_utc: DateTime<Utc>,
    pub started_at_utc: Option<DateTime<Utc>>,
}

/// Ordered view of a module's execution queue after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub module_id: String,
    pub reason: QueueChange,
    pub changed_conversation_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub entries: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn position_of(&self, conversation_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.conversation_id == conversation_id)
            .map(|e| e.queue_position)
    }
}
