//! Inbound side: request subscription, validation, and dispatch polling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use floorline_bus::{BusError, EventSubscriber, QueueChange};
use floorline_core::{ActionModel, InboundRequest, InputParameters, RequestRecord};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::broadcaster::StateBroadcaster;
use crate::envelope::RequestEnvelope;
use crate::error::{IngestError, SchedulerError};
use crate::machine::MachineDirectory;
use crate::queue::ExecutionQueue;
use crate::session::SessionTable;

const RECV_RETRY_DELAY: Duration = Duration::from_millis(200);

type Inbox = Arc<Mutex<VecDeque<RequestRecord>>>;

/// Everything the skill executor needs for the request it is about to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub action_id: String,
    pub action_title: String,
    pub machine_name: String,
    pub input_parameters: InputParameters,
    pub action_model: ActionModel,
    pub retry_attempts: u32,
}

impl From<&RequestEnvelope> for ExecutionContext {
    fn from(envelope: &RequestEnvelope) -> Self {
        Self {
            conversation_id: envelope.conversation_id.clone(),
            sender_id: envelope.sender_id.clone(),
            receiver_id: envelope.receiver_id.clone(),
            action_id: envelope.action_id.clone(),
            action_title: envelope.action_title.clone(),
            machine_name: envelope.machine_name.clone(),
            input_parameters: envelope.input_parameters.clone(),
            action_model: envelope.action_model.clone(),
            retry_attempts: envelope.retry_attempts(),
        }
    }
}

/// Result of one dispatch tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Request started; run the skill.
    Ready(ExecutionContext),
    /// Head request's machine is not lock-owned; it was backed off and requeued.
    WaitingForLock,
    /// Nothing eligible.
    Empty,
}

struct Listener {
    handle: JoinHandle<()>,
    subscriber: Arc<dyn EventSubscriber>,
}

/// Turns inbound records into queued envelopes and hands out the next
/// runnable one per tick.
pub struct RequestIngestor {
    queue: Arc<ExecutionQueue>,
    sessions: Arc<SessionTable>,
    broadcaster: Arc<StateBroadcaster>,
    directory: Arc<dyn MachineDirectory>,
    backoff: BackoffPolicy,
    request_topic: String,
    inbox: Inbox,
    subscribed: AtomicBool,
    listener: Mutex<Option<Listener>>,
}

impl RequestIngestor {
    pub fn new(
        queue: Arc<ExecutionQueue>,
        sessions: Arc<SessionTable>,
        broadcaster: Arc<StateBroadcaster>,
        directory: Arc<dyn MachineDirectory>,
        backoff: BackoffPolicy,
        request_topic: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            sessions,
            broadcaster,
            directory,
            backoff,
            request_topic: request_topic.into(),
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            subscribed: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Records received but not yet enqueued.
    pub fn pending_inbox(&self) -> usize {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    // ── Ingestion ──────────────────────────────────────────────

    /// Validate a request and append it to the queue.
    ///
    /// Rejected requests are logged and dropped; the error says why.
    pub async fn enqueue<R: InboundRequest + ?Sized>(
        &self,
        request: &R,
    ) -> Result<RequestEnvelope, IngestError> {
        let envelope = match self.try_build(request) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    conversation_id = %request.conversation_id(),
                    sender = %request.sender_id(),
                    reason = %e,
                    "skill request dropped"
                );
                return Err(e);
            }
        };

        let id = envelope.conversation_id.clone();
        self.sessions.reset(&id);
        info!(
            conversation_id = %id,
            action = %envelope.action_title,
            machine = %envelope.machine_name,
            queue_len = self.queue.len(),
            "skill request queued"
        );
        self.broadcaster.publish(QueueChange::Enqueue, &id).await;
        Ok(envelope)
    }

    fn try_build<R: InboundRequest + ?Sized>(&self, request: &R) -> Result<RequestEnvelope, IngestError> {
        let required = [
            ("conversation id", request.conversation_id()),
            ("sender id", request.sender_id()),
            ("action title", request.action_title()),
            ("machine name", request.machine_name()),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(IngestError::MissingField(field));
        }

        let envelope = RequestEnvelope::from_request(request, Utc::now());
        self.queue.try_enqueue(envelope.clone())?;
        Ok(envelope)
    }

    /// Hand a decoded record to the ingestor; it is enqueued on the next poll.
    pub fn deliver(&self, record: RequestRecord) {
        push_inbox(&self.inbox, record);
    }

    async fn drain_inbox(&self) {
        let records: Vec<RequestRecord> = {
            let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
            inbox.drain(..).collect()
        };
        for record in records {
            // failures are logged in enqueue
            let _ = self.enqueue(&record).await;
        }
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// One dispatch tick.
    ///
    /// Moves delivered records into the queue, then starts the first eligible
    /// request. If its machine is not lock-owned by this agent the request is
    /// backed off and moved to the tail instead.
    pub async fn poll_next(&self) -> PollOutcome {
        self.drain_inbox().await;

        let Some(envelope) = self.queue.try_start_next() else {
            return PollOutcome::Empty;
        };
        let id = envelope.conversation_id.clone();

        if !self.is_lock_owned(&envelope.machine_name).await {
            let delay = self.backoff.delay_for(envelope.retry_attempts());
            self.queue.increment_retry(&id, delay);
            self.queue.move_to_end_by_conversation_id(&id);
            info!(
                conversation_id = %id,
                machine = %envelope.machine_name,
                backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "machine not lock-owned, request requeued"
            );
            self.broadcaster.publish(QueueChange::Requeue, &id).await;
            return PollOutcome::WaitingForLock;
        }

        info!(conversation_id = %id, machine = %envelope.machine_name, "request started");
        self.broadcaster.publish(QueueChange::Start, &id).await;
        PollOutcome::Ready(ExecutionContext::from(&envelope))
    }

    async fn is_lock_owned(&self, machine_name: &str) -> bool {
        let Some(machine) = self.directory.machine(machine_name) else {
            warn!(machine = %machine_name, "unknown machine, treating as not lock-owned");
            return false;
        };
        machine.is_locked_by_us().await.unwrap_or_else(|e| {
            warn!(machine = %machine_name, error = %e, "lock probe failed");
            false
        })
    }

    // ── Subscription ───────────────────────────────────────────

    /// Subscribe to the skill-request topic and start the inbox listener.
    ///
    /// Calling again while subscribed does nothing.
    pub async fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> Result<(), SchedulerError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            debug!(topic = %self.request_topic, "already subscribed");
            return Ok(());
        }

        if let Err(e) = subscriber.subscribe(&self.request_topic).await {
            self.subscribed.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let handle = tokio::spawn(listen(
            subscriber.clone(),
            self.inbox.clone(),
            self.request_topic.clone(),
        ));
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(Listener { handle, subscriber });
        info!(topic = %self.request_topic, "subscribed to skill requests");
        Ok(())
    }

    /// Stop listening and drop undelivered records. Queued requests stay.
    pub async fn abort(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Listener { handle, subscriber }) = listener {
            handle.abort();
            if let Err(e) = subscriber.unsubscribe(&self.request_topic).await {
                warn!(topic = %self.request_topic, error = %e, "unsubscribe failed");
            }
        }

        let dropped = {
            let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
            let n = inbox.len();
            inbox.clear();
            n
        };
        self.subscribed.store(false, Ordering::SeqCst);
        info!(topic = %self.request_topic, dropped, "skill request listener stopped");
    }
}

impl Drop for RequestIngestor {
    fn drop(&mut self) {
        if let Some(listener) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.handle.abort();
        }
    }
}

fn push_inbox(inbox: &Inbox, record: RequestRecord) {
    inbox
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(record);
}

async fn listen(subscriber: Arc<dyn EventSubscriber>, inbox: Inbox, topic: String) {
    loop {
        match subscriber.recv().await {
            Ok(message) if message.topic.starts_with(&topic) => {
                match message.decode::<RequestRecord>() {
                    Ok(record) => {
                        debug!(conversation_id = %record.conversation_id, "skill request received");
                        push_inbox(&inbox, record);
                    }
                    Err(e) => warn!(topic = %message.topic, error = %e, "undecodable skill request dropped"),
                }
            }
            Ok(_) => {}
            Err(BusError::Closed) => {
                info!(topic = %topic, "request subscription closed");
                break;
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "receive failed");
                tokio::time::sleep(RECV_RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use floorline_bus::{InMemoryBus, Message, Participant};
    use floorline_core::QueueState;

    use super::*;
    use crate::machine::MachineRegistry;
    use crate::testing::{MockPublisher, ScriptedMachine};

    struct Fixture {
        queue: Arc<ExecutionQueue>,
        sessions: Arc<SessionTable>,
        publisher: Arc<MockPublisher>,
        machine: Arc<ScriptedMachine>,
        ingestor: RequestIngestor,
    }

    const REQUEST_TOPIC: &str = "/P102/P102_ExecutionHolon/SkillRequest";

    fn fixture(capacity: usize) -> Fixture {
        let queue = Arc::new(ExecutionQueue::new(capacity));
        let sessions = Arc::new(SessionTable::new());
        let publisher = Arc::new(MockPublisher::new());
        let machine = Arc::new(ScriptedMachine::ready("CA-Module"));
        let directory = Arc::new(MachineRegistry::new().with(machine.clone()));
        let broadcaster = Arc::new(StateBroadcaster::new(
            "P102",
            Participant::new("P102_Execution_Agent", "ExecutionHolon"),
            "/P102/P102_ExecutionHolon/ActionQueue",
            queue.clone(),
            publisher.clone(),
        ));
        let ingestor = RequestIngestor::new(
            queue.clone(),
            sessions.clone(),
            broadcaster,
            directory,
            BackoffPolicy::constant(Duration::from_secs(5)),
            REQUEST_TOPIC,
        );
        Fixture {
            queue,
            sessions,
            publisher,
            machine,
            ingestor,
        }
    }

    fn record(id: &str) -> RequestRecord {
        RequestRecord::new(id, "Retrieve", "CA-Module").with_sender("Planner")
    }

    #[tokio::test]
    async fn enqueue_broadcasts_and_resets_session() {
        let f = fixture(0);
        f.sessions.suppress_next_error("c1");

        let envelope = f.ingestor.enqueue(&record("c1")).await.unwrap();

        assert_eq!(envelope.queue_state(), QueueState::Pending);
        assert!(!f.sessions.contains("c1"));
        let snapshots = f.publisher.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].reason, QueueChange::Enqueue);
        assert_eq!(snapshots[0].changed_conversation_id, "c1");
    }

    #[tokio::test]
    async fn incomplete_records_are_dropped() {
        let f = fixture(0);
        let no_sender = RequestRecord::new("c1", "Retrieve", "CA-Module");
        let no_machine = record("c2").with_receiver("x");
        let no_machine = RequestRecord {
            machine_name: "  ".into(),
            ..no_machine
        };

        assert_eq!(
            f.ingestor.enqueue(&no_sender).await,
            Err(IngestError::MissingField("sender id"))
        );
        assert_eq!(
            f.ingestor.enqueue(&no_machine).await,
            Err(IngestError::MissingField("machine name"))
        );
        assert_eq!(
            f.ingestor.enqueue(&record("")).await,
            Err(IngestError::MissingField("conversation id"))
        );
        assert!(f.queue.is_empty());
        assert!(f.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_conversation_is_dropped() {
        let f = fixture(0);
        f.ingestor.enqueue(&record("c1")).await.unwrap();
        assert_eq!(
            f.ingestor.enqueue(&record("c1")).await,
            Err(IngestError::Duplicate("c1".into()))
        );
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let f = fixture(1);
        f.ingestor.enqueue(&record("c1")).await.unwrap();
        assert_eq!(
            f.ingestor.enqueue(&record("c2")).await,
            Err(IngestError::QueueFull { capacity: 1, len: 1 })
        );
    }

    #[tokio::test]
    async fn poll_on_empty_queue() {
        let f = fixture(0);
        assert_eq!(f.ingestor.poll_next().await, PollOutcome::Empty);
    }

    #[tokio::test]
    async fn poll_drains_inbox_and_starts_request() {
        let f = fixture(0);
        f.ingestor
            .deliver(record("c1").with_parameter("ProductId", "prod-1"));
        assert_eq!(f.ingestor.pending_inbox(), 1);

        let PollOutcome::Ready(ctx) = f.ingestor.poll_next().await else {
            panic!("expected a ready request");
        };
        assert_eq!(ctx.conversation_id, "c1");
        assert_eq!(ctx.sender_id, "Planner");
        assert_eq!(ctx.input_parameters.get_str("PRODUCTID"), Some("prod-1"));
        assert_eq!(f.ingestor.pending_inbox(), 0);
        assert_eq!(f.queue.get("c1").unwrap().queue_state(), QueueState::Running);

        let reasons: Vec<QueueChange> = f.publisher.snapshots().await.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![QueueChange::Enqueue, QueueChange::Start]);
    }

    #[tokio::test]
    async fn not_lock_owned_backs_off_and_requeues() {
        let f = fixture(0);
        f.machine.set_locked(false);
        f.ingestor.enqueue(&record("c1")).await.unwrap();
        f.ingestor.enqueue(&record("c2")).await.unwrap();

        assert_eq!(f.ingestor.poll_next().await, PollOutcome::WaitingForLock);

        let snapshot = f.queue.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|e| e.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
        let c1 = &snapshot[1];
        assert_eq!(c1.queue_state(), QueueState::Pending);
        assert_eq!(c1.retry_attempts(), 1);
        assert!(c1.next_retry_at().unwrap() > Utc::now());
        assert_eq!(
            f.publisher.snapshots().await.last().unwrap().reason,
            QueueChange::Requeue
        );
    }

    #[tokio::test]
    async fn backed_off_request_does_not_block_next() {
        let f = fixture(0);
        f.machine.set_locked(false);
        f.ingestor.enqueue(&record("c1")).await.unwrap();
        f.ingestor.enqueue(&record("c2")).await.unwrap();
        assert_eq!(f.ingestor.poll_next().await, PollOutcome::WaitingForLock);

        f.machine.set_locked(true);
        match f.ingestor.poll_next().await {
            PollOutcome::Ready(ctx) => assert_eq!(ctx.conversation_id, "c2"),
            other => panic!("expected c2 to start, got {other:?}"),
        }
        // c1 is still inside its backoff window
        assert_eq!(f.ingestor.poll_next().await, PollOutcome::Empty);
    }

    #[tokio::test]
    async fn unknown_machine_is_not_lock_owned() {
        let f = fixture(0);
        let stray = RequestRecord::new("c1", "Retrieve", "Ghost").with_sender("Planner");
        f.ingestor.enqueue(&stray).await.unwrap();

        assert_eq!(f.ingestor.poll_next().await, PollOutcome::WaitingForLock);
        assert_eq!(f.machine.lock_checks(), 0);
    }

    #[tokio::test]
    async fn subscription_feeds_inbox_and_is_idempotent() {
        let f = fixture(0);
        let bus = InMemoryBus::default();
        let subscriber: Arc<dyn EventSubscriber> = Arc::new(bus.subscriber());

        f.ingestor.subscribe(subscriber.clone()).await.unwrap();
        f.ingestor.subscribe(subscriber).await.unwrap();
        assert!(f.ingestor.is_subscribed());

        let publisher = bus.publisher();
        use floorline_bus::EventPublisher;
        publisher
            .publish(Message::new(REQUEST_TOPIC, &record("c1")).unwrap())
            .await
            .unwrap();

        let mut waited = Duration::ZERO;
        while f.ingestor.pending_inbox() == 0 && waited < Duration::from_secs(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        assert_eq!(f.ingestor.pending_inbox(), 1, "exactly one listener delivers");
        assert!(matches!(f.ingestor.poll_next().await, PollOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn abort_clears_inbox_but_keeps_queue() {
        let f = fixture(0);
        let bus = InMemoryBus::default();
        f.ingestor.subscribe(Arc::new(bus.subscriber())).await.unwrap();
        f.ingestor.enqueue(&record("c1")).await.unwrap();
        f.ingestor.deliver(record("c2"));

        f.ingestor.abort().await;

        assert!(!f.ingestor.is_subscribed());
        assert_eq!(f.ingestor.pending_inbox(), 0);
        assert!(f.queue.contains("c1"));
        assert!(!f.queue.contains("c2"));

        // resubscribing after abort works again
        f.ingestor.subscribe(Arc::new(bus.subscriber())).await.unwrap();
        assert!(f.ingestor.is_subscribed());
    }
}
