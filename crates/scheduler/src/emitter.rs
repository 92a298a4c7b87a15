//! Outbound completion protocol.

use std::sync::Arc;

use floorline_bus::{
    EventPublisher, Frame, Message, MessageCategory, Participant, PreconditionRetry, QueueChange,
    SkillResponse,
};
use floorline_core::ActionState;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::broadcaster::StateBroadcaster;
use crate::envelope::RequestEnvelope;
use crate::error::SchedulerError;
use crate::queue::ExecutionQueue;
use crate::session::SessionTable;

const REQUESTER_ROLE: &str = "PlanningAgent";
const EXECUTIONS_COUNT_KEY: &str = "successfulexecutionscount";

/// How a response is framed for the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Rejected before start.
    Rejected,
    /// Accepted before start.
    Accepted,
    Progress,
    /// Runtime error.
    Failed,
}

impl ResponseKind {
    pub fn category(self) -> MessageCategory {
        match self {
            Self::Rejected => MessageCategory::Refusal,
            Self::Accepted => MessageCategory::Consent,
            Self::Progress => MessageCategory::Inform,
            Self::Failed => MessageCategory::Failure,
        }
    }

    /// ERROR is a failure, everything else progress.
    pub fn default_for(state: ActionState) -> Self {
        match state {
            ActionState::Error => Self::Failed,
            _ => Self::Progress,
        }
    }
}

/// Completion or state signal for a queued conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSignal {
    pub conversation_id: String,
    /// Raw state, normalized on emit.
    pub state: String,
    pub kind: Option<ResponseKind>,
    pub step: Option<String>,
    pub log_message: Option<String>,
    pub result_data: Option<IndexMap<String, Value>>,
    pub successful_executions: Option<i64>,
}

impl ResponseSignal {
    pub fn new(conversation_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: state.into(),
            kind: None,
            step: None,
            log_message: None,
            result_data: None,
            successful_executions: None,
        }
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    pub fn with_result_data(mut self, data: IndexMap<String, Value>) -> Self {
        self.result_data = Some(data);
        self
    }

    pub fn with_successful_executions(mut self, count: i64) -> Self {
        self.successful_executions = Some(count);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The conversation already left the queue, so its ERROR was sent.
    DuplicateError,
    /// The request was requeued for unmet readiness this tick.
    PreconditionRequeue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Sent {
        category: MessageCategory,
        state: ActionState,
        /// Terminal state removed the envelope.
        removed: bool,
    },
    Suppressed(Suppression),
}

/// Maps state signals to outbound messages and cleans up terminal conversations.
pub struct ResponseEmitter {
    sender: Participant,
    topic: String,
    queue: Arc<ExecutionQueue>,
    sessions: Arc<SessionTable>,
    broadcaster: Arc<StateBroadcaster>,
    publisher: Arc<dyn EventPublisher>,
}

impl ResponseEmitter {
    pub fn new(
        sender: Participant,
        topic: impl Into<String>,
        queue: Arc<ExecutionQueue>,
        sessions: Arc<SessionTable>,
        broadcaster: Arc<StateBroadcaster>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            sender,
            topic: topic.into(),
            queue,
            sessions,
            broadcaster,
            publisher,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send the response for `signal`.
    ///
    /// A publish error is returned with queue and session state untouched.
    pub async fn emit(&self, signal: ResponseSignal) -> Result<EmitOutcome, SchedulerError> {
        let id = signal.conversation_id.as_str();
        let state = ActionState::normalize(&signal.state);

        if state == ActionState::Error {
            if self.sessions.take_suppression(id) {
                debug!(conversation_id = %id, "ERROR suppressed after precondition requeue");
                return Ok(EmitOutcome::Suppressed(Suppression::PreconditionRequeue));
            }
            if !self.queue.contains(id) {
                debug!(conversation_id = %id, "ERROR for a finished conversation suppressed");
                return Ok(EmitOutcome::Suppressed(Suppression::DuplicateError));
            }
        }

        let envelope = self
            .queue
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownConversation(id.to_string()))?;

        let kind = signal.kind.unwrap_or_else(|| ResponseKind::default_for(state));
        let category = kind.category();
        let response = build_response(&envelope, state, category, &signal);

        let message = Message::framed(
            self.topic.clone(),
            self.frame(category, &envelope),
            &response,
        )?;
        self.publisher.publish(message).await?;

        let removed = state.is_terminal() && self.discard(id).await.is_some();

        info!(
            conversation_id = %id,
            state = %state,
            category = %category,
            receiver = %envelope.sender_id,
            "response sent"
        );
        Ok(EmitOutcome::Sent {
            category,
            state,
            removed,
        })
    }

    /// Drop a conversation from the queue and forget its session.
    ///
    /// Broadcasts `Remove` only when an envelope was actually removed.
    pub async fn discard(&self, conversation_id: &str) -> Option<RequestEnvelope> {
        let removed = self.queue.try_remove_by_conversation_id(conversation_id);
        self.sessions.reset(conversation_id);
        if removed.is_some() {
            self.broadcaster.publish(QueueChange::Remove, conversation_id).await;
        }
        removed
    }

    /// Tell the requester its request was pushed back.
    pub async fn notify_retry(
        &self,
        envelope: &RequestEnvelope,
        reason: &str,
    ) -> Result<(), SchedulerError> {
        let notice = PreconditionRetry::new(
            envelope.action_title.clone(),
            envelope.machine_name.clone(),
            reason,
            envelope.retry_attempts(),
            envelope.next_retry_at(),
        );
        let message = Message::framed(
            self.topic.clone(),
            self.frame(MessageCategory::Update, envelope),
            &notice,
        )?;
        self.publisher.publish(message).await?;
        debug!(
            conversation_id = %envelope.conversation_id,
            attempts = envelope.retry_attempts(),
            "precondition retry notice sent"
        );
        Ok(())
    }

    fn frame(&self, category: MessageCategory, envelope: &RequestEnvelope) -> Frame {
        Frame {
            category,
            conversation_id: envelope.conversation_id.clone(),
            sender: self.sender.clone(),
            receiver: Participant::new(envelope.sender_id.clone(), REQUESTER_ROLE),
        }
    }
}

fn build_response(
    envelope: &RequestEnvelope,
    state: ActionState,
    category: MessageCategory,
    signal: &ResponseSignal,
) -> SkillResponse {
    let mut response = SkillResponse::new(state, envelope.action_title.clone(), envelope.machine_name.clone());
    response.step = signal.step.clone();

    match category {
        MessageCategory::Consent => {
            response.input_parameters = Some(envelope.input_parameters.clone());
        }
        MessageCategory::Refusal | MessageCategory::Failure => {
            response.log_message = signal.log_message.clone().filter(|m| !m.is_empty());
        }
        _ => {}
    }

    if state == ActionState::Done {
        response.successful_executions_count = signal
            .successful_executions
            .or_else(|| signal.result_data.as_ref().and_then(successful_executions_from));
        response.final_result_data = signal.result_data.clone();
    }
    response
}

/// Execution counter from result data: first key containing
/// `SuccessfulExecutionsCount` (any case) with an integer value.
pub fn successful_executions_from(data: &IndexMap<String, Value>) -> Option<i64> {
    data.iter()
        .filter(|(key, _)| key.to_lowercase().contains(EXECUTIONS_COUNT_KEY))
        .find_map(|(_, value)| as_count(value))
}

fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
