use std::sync::Arc;

use floorline_bus::{EventPublisher, EventSubscriber, Participant, TopicScheme};
use floorline_core::{AgentConfig, InboundRequest, RequestRecord};
use tracing::info;

use crate::admission::{Admission, AdmissionController};
use crate::backoff::BackoffPolicy;
use crate::broadcaster::StateBroadcaster;
use crate::emitter::{EmitOutcome, ResponseEmitter, ResponseSignal};
use crate::envelope::RequestEnvelope;
use crate::error::{IngestError, SchedulerError};
use crate::ingestor::{ExecutionContext, PollOutcome, RequestIngestor};
use crate::machine::MachineDirectory;
use crate::precondition::PreconditionGate;
use crate::queue::ExecutionQueue;
use crate::session::SessionTable;

/// Execution scheduler for one module instance.
///
/// The driver loop is expected to call [`poll`](Self::poll), then
/// [`admit`](Self::admit) on a ready request, run the skill, and report
/// through [`respond`](Self::respond) before polling again.
pub struct ModuleScheduler {
    topics: TopicScheme,
    queue: Arc<ExecutionQueue>,
    sessions: Arc<SessionTable>,
    broadcaster: Arc<StateBroadcaster>,
    ingestor: RequestIngestor,
    emitter: Arc<ResponseEmitter>,
    admission: AdmissionController,
}

impl ModuleScheduler {
    pub fn new(
        config: &AgentConfig,
        publisher: Arc<dyn EventPublisher>,
        directory: Arc<dyn MachineDirectory>,
    ) -> Self {
        let topics = TopicScheme::from_agent(&config.agent);
        let sender = Participant::new(config.agent.agent_id(), config.agent.role.clone());
        let settings = &config.scheduler;
        let backoff = BackoffPolicy::from_settings(settings);

        let queue = Arc::new(ExecutionQueue::new(settings.queue_capacity));
        let sessions = Arc::new(SessionTable::new());
        let broadcaster = Arc::new(StateBroadcaster::new(
            topics.module_id(),
            sender.clone(),
            topics.action_queue(),
            queue.clone(),
            publisher.clone(),
        ));
        let emitter = Arc::new(ResponseEmitter::new(
            sender,
            topics.skill_response(),
            queue.clone(),
            sessions.clone(),
            broadcaster.clone(),
            publisher,
        ));
        let ingestor = RequestIngestor::new(
            queue.clone(),
            sessions.clone(),
            broadcaster.clone(),
            directory.clone(),
            backoff,
            topics.skill_request(),
        );
        let admission = AdmissionController::new(
            PreconditionGate::new(),
            queue.clone(),
            sessions.clone(),
            broadcaster.clone(),
            emitter.clone(),
            directory,
            backoff,
            settings.max_precondition_retries,
        );

        info!(
            module = %topics.module_id(),
            capacity = settings.queue_capacity,
            backoff = %settings.backoff,
            "module scheduler ready"
        );

        Self {
            topics,
            queue,
            sessions,
            broadcaster,
            ingestor,
            emitter,
            admission,
        }
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    pub fn queue(&self) -> &Arc<ExecutionQueue> {
        &self.queue
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn broadcaster(&self) -> &Arc<StateBroadcaster> {
        &self.broadcaster
    }

    // ── Inbound ────────────────────────────────────────────────

    pub async fn enqueue<R: InboundRequest + ?Sized>(
        &self,
        request: &R,
    ) -> Result<RequestEnvelope, IngestError> {
        self.ingestor.enqueue(request).await
    }

    pub fn deliver(&self, record: RequestRecord) {
        self.ingestor.deliver(record);
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> Result<(), SchedulerError> {
        self.ingestor.subscribe(subscriber).await
    }

    pub async fn abort(&self) {
        self.ingestor.abort().await;
    }

    // ── Dispatch ───────────────────────────────────────────────

    pub async fn poll(&self) -> PollOutcome {
        self.ingestor.poll_next().await
    }

    pub async fn admit(&self, context: &ExecutionContext) -> Result<Admission, SchedulerError> {
        self.admission.admit(context).await
    }

    // ── Outbound ───────────────────────────────────────────────

    pub async fn respond(&self, signal: ResponseSignal) -> Result<EmitOutcome, SchedulerError> {
        self.emitter.emit(signal).await
    }

    /// Withdraw a request without answering it.
    pub async fn remove(&self, conversation_id: &str) -> Option<RequestEnvelope> {
        let removed = self.emitter.discard(conversation_id).await;
        if removed.is_some() {
            info!(conversation_id = %conversation_id, "request withdrawn");
        }
        removed
    }

    /// Queue contents in order.
    pub fn snapshot(&self) -> Vec<RequestEnvelope> {
        self.queue.snapshot()
    }
}
