use std::time::Duration;

use chrono::{DateTime, Utc};
use floorline_core::{ActionModel, InboundRequest, InputParameters, QueueState};

/// One queued execution request plus its scheduling metadata.
///
/// Scheduling fields are only changed through [`ExecutionQueue`](crate::ExecutionQueue).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub action_id: String,
    pub action_title: String,
    pub machine_name: String,
    pub action_status: String,
    pub input_parameters: InputParameters,
    pub action_model: ActionModel,

    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    retry_attempts: u32,
    next_retry_at: Option<DateTime<Utc>>,
    queue_state: QueueState,
}

impl RequestEnvelope {
    pub fn from_request<R: InboundRequest + ?Sized>(request: &R, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: request.conversation_id().to_string(),
            sender_id: request.sender_id().to_string(),
            receiver_id: request.receiver_id().to_string(),
            action_id: request.action_id().to_string(),
            action_title: request.action_title().to_string(),
            machine_name: request.machine_name().to_string(),
            action_status: request.status().to_string(),
            input_parameters: request.input_parameters().clone(),
            action_model: request.action_model(),
            enqueued_at: now,
            started_at: None,
            retry_attempts: 0,
            next_retry_at: None,
            queue_state: QueueState::Pending,
        }
    }

    /// The conversation id doubles as the product/order key.
    pub fn product_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue_state
    }

    /// Start time if started, else enqueue time.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.enqueued_at)
    }

    pub(crate) fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.queue_state == QueueState::Pending && self.next_retry_at.map_or(true, |t| t <= now)
    }

    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.queue_state = QueueState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub(crate) fn mark_pending(&mut self) {
        self.queue_state = QueueState::Pending;
    }

    pub(crate) fn increment_retry(&mut self, backoff: Duration, now: DateTime<Utc>) {
        self.retry_attempts = self.retry_attempts.saturating_add(1);
        let backoff = chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::MAX);
        self.next_retry_at = Some(now.checked_add_signed(backoff).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }
}
