//! Per-conversation response state.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Response bookkeeping keyed by conversation id.
///
/// Only queued conversations have an entry. Every removal from the queue
/// resets the conversation, so the table never outgrows the queue.
#[derive(Debug, Default)]
pub struct SessionTable {
    suppressed: Mutex<HashSet<String>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn suppressed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.suppressed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget everything about a conversation.
    pub fn reset(&self, conversation_id: &str) {
        self.suppressed().remove(conversation_id);
    }

    /// Swallow the next ERROR signal for this conversation.
    pub fn suppress_next_error(&self, conversation_id: &str) {
        self.suppressed().insert(conversation_id.to_string());
    }

    /// Consume the one-shot suppression flag.
    pub fn take_suppression(&self, conversation_id: &str) -> bool {
        self.suppressed().remove(conversation_id)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.suppressed().contains(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.suppressed().len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppressed().is_empty()
    }
}
