//! Bounded FIFO of pending and running requests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::envelope::RequestEnvelope;
use crate::error::IngestError;

/// Execution queue of one module agent.
///
/// Arrival order is kept except that a requeued envelope moves to the tail.
/// All operations take one lock and return owned copies.
pub struct ExecutionQueue {
    capacity: usize,
    entries: Mutex<Vec<RequestEnvelope>>,
}

impl ExecutionQueue {
    /// `capacity` 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<RequestEnvelope>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Append an envelope and return the new length.
    ///
    /// Rejects a conversation id that is already queued and any envelope
    /// beyond capacity. Both checks happen under the append lock.
    pub fn try_enqueue(&self, envelope: RequestEnvelope) -> Result<usize, IngestError> {
        let mut entries = self.entries();
        if entries
            .iter()
            .any(|e| e.conversation_id == envelope.conversation_id)
        {
            return Err(IngestError::Duplicate(envelope.conversation_id));
        }
        if self.capacity > 0 && entries.len() >= self.capacity {
            return Err(IngestError::QueueFull {
                capacity: self.capacity,
                len: entries.len(),
            });
        }
        entries.push(envelope);
        Ok(entries.len())
    }

    /// Mark the first eligible pending envelope as running and return it.
    pub fn try_start_next(&self) -> Option<RequestEnvelope> {
        self.try_start_next_at(Utc::now())
    }

    pub fn try_start_next_at(&self, now: DateTime<Utc>) -> Option<RequestEnvelope> {
        let mut entries = self.entries();
        let envelope = entries.iter_mut().find(|e| e.is_eligible_at(now))?;
        envelope.mark_running(now);
        debug!(conversation_id = %envelope.conversation_id, "started");
        Some(envelope.clone())
    }

    pub fn try_remove_by_conversation_id(&self, conversation_id: &str) -> Option<RequestEnvelope> {
        if conversation_id.trim().is_empty() {
            return None;
        }
        let mut entries = self.entries();
        let index = entries
            .iter()
            .position(|e| e.conversation_id == conversation_id)?;
        Some(entries.remove(index))
    }

    /// Move an envelope to the tail and reset it to pending.
    pub fn move_to_end_by_conversation_id(&self, conversation_id: &str) -> Option<RequestEnvelope> {
        if conversation_id.trim().is_empty() {
            return None;
        }
        let mut entries = self.entries();
        let index = entries
            .iter()
            .position(|e| e.conversation_id == conversation_id)?;
        let mut envelope = entries.remove(index);
        envelope.mark_pending();
        entries.push(envelope.clone());
        Some(envelope)
    }

    /// Count a retry and defer the envelope by `backoff`.
    pub fn increment_retry(&self, conversation_id: &str, backoff: Duration) -> Option<RequestEnvelope> {
        self.increment_retry_at(conversation_id, backoff, Utc::now())
    }

    pub fn increment_retry_at(
        &self,
        conversation_id: &str,
        backoff: Duration,
        now: DateTime<Utc>,
    ) -> Option<RequestEnvelope> {
        let mut entries = self.entries();
        let envelope = entries
            .iter_mut()
            .find(|e| e.conversation_id == conversation_id)?;
        envelope.increment_retry(backoff, now);
        Some(envelope.clone())
    }

    pub fn get(&self, conversation_id: &str) -> Option<RequestEnvelope> {
        self.entries()
            .iter()
            .find(|e| e.conversation_id == conversation_id)
            .cloned()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.conversation_id == conversation_id)
    }

    /// Ordered copy of the queue.
    pub fn snapshot(&self) -> Vec<RequestEnvelope> {
        self.entries().clone()
    }
}
