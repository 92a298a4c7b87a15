//! Precondition admission for a started request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use floorline_bus::QueueChange;
use floorline_core::ActionState;
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::broadcaster::StateBroadcaster;
use crate::emitter::{ResponseEmitter, ResponseKind, ResponseSignal};
use crate::error::SchedulerError;
use crate::ingestor::ExecutionContext;
use crate::machine::MachineDirectory;
use crate::precondition::{GatePhase, PreconditionGate, PreconditionReport};
use crate::queue::ExecutionQueue;
use crate::session::SessionTable;

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Machine ready and all declared preconditions hold.
    Admitted,
    /// Machine not ready; the request waits at the tail.
    Requeued {
        attempts: u32,
        next_retry_at: Option<DateTime<Utc>>,
    },
    /// Refusal sent and the request removed.
    Refused { reason: String },
}

pub struct AdmissionController {
    gate: PreconditionGate,
    queue: Arc<ExecutionQueue>,
    sessions: Arc<SessionTable>,
    broadcaster: Arc<StateBroadcaster>,
    emitter: Arc<ResponseEmitter>,
    directory: Arc<dyn MachineDirectory>,
    backoff: BackoffPolicy,
    max_retries: Option<u32>,
}

impl AdmissionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: PreconditionGate,
        queue: Arc<ExecutionQueue>,
        sessions: Arc<SessionTable>,
        broadcaster: Arc<StateBroadcaster>,
        emitter: Arc<ResponseEmitter>,
        directory: Arc<dyn MachineDirectory>,
        backoff: BackoffPolicy,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            gate,
            queue,
            sessions,
            broadcaster,
            emitter,
            directory,
            backoff,
            max_retries,
        }
    }

    /// Check readiness and declared preconditions for a started request.
    ///
    /// Not-ready machines push the request back with backoff and arm a
    /// one-shot ERROR suppression for the conversation, so the executor's
    /// failure signal for this tick is swallowed. Failed declared
    /// preconditions refuse the request.
    pub async fn admit(&self, context: &ExecutionContext) -> Result<Admission, SchedulerError> {
        let id = context.conversation_id.as_str();
        // A flag left over from an earlier tick must not outlive it.
        self.sessions.take_suppression(id);

        let envelope = self
            .queue
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownConversation(id.to_string()))?;

        let report = match self.directory.machine(&context.machine_name) {
            Some(machine) => self.gate.evaluate(machine.as_ref(), Some(&envelope)).await,
            None => self.gate.unknown_machine(&context.machine_name),
        };

        match report.failed_phase() {
            None => {
                info!(conversation_id = %id, machine = %context.machine_name, "preconditions satisfied");
                Ok(Admission::Admitted)
            }
            Some(GatePhase::Readiness) => {
                let attempts = envelope.retry_attempts();
                match self.max_retries {
                    Some(max) if attempts >= max => {
                        let reason = format!(
                            "Preconditions not satisfied after {attempts} attempts: {}",
                            first_failure(&report)
                        );
                        self.refuse(id, reason).await
                    }
                    _ => self.requeue(context, &report).await,
                }
            }
            Some(GatePhase::Declared) => self.refuse(id, report.summary()).await,
        }
    }

    async fn requeue(
        &self,
        context: &ExecutionContext,
        report: &PreconditionReport,
    ) -> Result<Admission, SchedulerError> {
        let id = context.conversation_id.as_str();
        let reason = first_failure(report);
        let attempts = self
            .queue
            .get(id)
            .map(|e| e.retry_attempts())
            .unwrap_or(context.retry_attempts);
        let delay = self.backoff.delay_for(attempts);

        self.queue.increment_retry(id, delay);
        let Some(envelope) = self.queue.move_to_end_by_conversation_id(id) else {
            return Err(SchedulerError::UnknownConversation(id.to_string()));
        };

        info!(
            conversation_id = %id,
            machine = %context.machine_name,
            attempts = envelope.retry_attempts(),
            backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason = %reason,
            "machine not ready, request requeued"
        );

        if let Err(e) = self.emitter.notify_retry(&envelope, &reason).await {
            warn!(conversation_id = %id, error = %e, "failed to send precondition retry notice");
        }
        self.broadcaster.publish(QueueChange::Requeue, id).await;
        self.sessions.suppress_next_error(id);

        Ok(Admission::Requeued {
            attempts: envelope.retry_attempts(),
            next_retry_at: envelope.next_retry_at(),
        })
    }

    async fn refuse(&self, id: &str, reason: String) -> Result<Admission, SchedulerError> {
        info!(conversation_id = %id, reason = %reason, "preconditions failed, request refused");
        let signal = ResponseSignal::new(id, ActionState::Error.as_str())
            .with_kind(ResponseKind::Rejected)
            .with_log_message(reason.clone());
        self.emitter.emit(signal).await?;
        Ok(Admission::Refused { reason })
    }
}

fn first_failure(report: &PreconditionReport) -> String {
    report.first_failure().unwrap_or("Preconditions not satisfied").to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use floorline_bus::{MessageCategory, Participant, PreconditionRetry, SkillResponse};
    use floorline_core::{DeclaredPrecondition, QueueState, RequestRecord};

    use super::*;
    use crate::emitter::{EmitOutcome, Suppression};
    use crate::envelope::RequestEnvelope;
    use crate::machine::{MachineRegistry, StorageProbe};
    use crate::testing::{MockPublisher, ScriptedMachine, ScriptedStorage};

    const RESPONSE_TOPIC: &str = "/P102/P102_ExecutionHolon/SkillResponse";

    struct Fixture {
        queue: Arc<ExecutionQueue>,
        sessions: Arc<SessionTable>,
        publisher: Arc<MockPublisher>,
        emitter: Arc<ResponseEmitter>,
        admission: AdmissionController,
    }

    fn fixture(machine: ScriptedMachine, max_retries: Option<u32>) -> Fixture {
        let queue = Arc::new(ExecutionQueue::new(0));
        let sessions = Arc::new(SessionTable::new());
        let publisher = Arc::new(MockPublisher::new());
        let sender = Participant::new("P102_Execution_Agent", "ExecutionHolon");
        let broadcaster = Arc::new(StateBroadcaster::new(
            "P102",
            sender.clone(),
            "/P102/P102_ExecutionHolon/ActionQueue",
            queue.clone(),
            publisher.clone(),
        ));
        let emitter = Arc::new(ResponseEmitter::new(
            sender,
            RESPONSE_TOPIC,
            queue.clone(),
            sessions.clone(),
            broadcaster.clone(),
            publisher.clone(),
        ));
        let directory = Arc::new(MachineRegistry::new().with(Arc::new(machine)));
        let admission = AdmissionController::new(
            PreconditionGate::new(),
            queue.clone(),
            sessions.clone(),
            broadcaster,
            emitter.clone(),
            directory,
            BackoffPolicy::constant(Duration::from_secs(5)),
            max_retries,
        );
        Fixture {
            queue,
            sessions,
            publisher,
            emitter,
            admission,
        }
    }

    fn start(f: &Fixture, record: RequestRecord) -> ExecutionContext {
        f.queue
            .try_enqueue(RequestEnvelope::from_request(&record, Utc::now()))
            .unwrap();
        let envelope = f.queue.try_start_next().unwrap();
        ExecutionContext::from(&envelope)
    }

    fn record(id: &str) -> RequestRecord {
        RequestRecord::new(id, "Retrieve", "CA-Module").with_sender("Planner")
    }

    #[tokio::test]
    async fn ready_machine_without_preconditions_is_admitted() {
        let f = fixture(ScriptedMachine::ready("CA-Module"), None);
        let ctx = start(&f, record("c1"));

        assert_eq!(f.admission.admit(&ctx).await.unwrap(), Admission::Admitted);
        assert_eq!(f.queue.get("c1").unwrap().queue_state(), QueueState::Running);
        assert!(f.publisher.messages().await.is_empty());
    }

    #[tokio::test]
    async fn not_ready_requeues_with_notice_and_suppresses_error() {
        let f = fixture(ScriptedMachine::ready("CA-Module").coupled(false), None);
        let ctx = start(&f, record("c1"));
        f.queue
            .try_enqueue(RequestEnvelope::from_request(&record("c0"), Utc::now()))
            .unwrap();
        assert_eq!(ctx.conversation_id, "c1");

        let admission = f.admission.admit(&ctx).await.unwrap();
        let Admission::Requeued { attempts, next_retry_at } = admission else {
            panic!("expected requeue, got {admission:?}");
        };
        assert_eq!(attempts, 1);
        assert!(next_retry_at.unwrap() > Utc::now());

        let order: Vec<String> = f.queue.snapshot().into_iter().map(|e| e.conversation_id).collect();
        assert_eq!(order, vec!["c0", "c1"]);
        assert_eq!(f.queue.get("c1").unwrap().queue_state(), QueueState::Pending);

        let updates = f.publisher.with_category(MessageCategory::Update).await;
        assert_eq!(updates.len(), 1);
        let notice: PreconditionRetry = updates[0].decode().unwrap();
        assert_eq!(notice.action_state, PreconditionRetry::ACTION_STATE);
        assert_eq!(notice.reason, "Coupled: Module 'CA-Module' is not coupled.");
        assert_eq!(notice.attempts, 1);
        assert_eq!(
            f.publisher.snapshots().await.last().unwrap().reason,
            QueueChange::Requeue
        );

        // the executor's ERROR for this tick is swallowed
        let outcome = f
            .emitter
            .emit(ResponseSignal::new("c1", "ERROR"))
            .await
            .unwrap();
        assert_eq!(outcome, EmitOutcome::Suppressed(Suppression::PreconditionRequeue));
        assert!(f.queue.contains("c1"));
    }

    #[tokio::test]
    async fn stale_suppression_does_not_swallow_refusal() {
        let machine = ScriptedMachine::ready("CA-Module").with_storage(Arc::new(ScriptedStorage::holding("S1", &[])));
        let f = fixture(machine, None);
        let ctx = start(
            &f,
            record("c1").with_precondition(DeclaredPrecondition::in_storage("prod-9")),
        );
        f.sessions.suppress_next_error("c1");

        let admission = f.admission.admit(&ctx).await.unwrap();

        assert!(matches!(admission, Admission::Refused { .. }));
        assert_eq!(f.publisher.with_category(MessageCategory::Refusal).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_declared_preconditions_refuse_with_all_failures() {
        let storage: Arc<dyn StorageProbe> = Arc::new(ScriptedStorage::holding("S1", &["prod-1"]));
        let f = fixture(ScriptedMachine::ready("CA-Module").with_storage(storage), None);
        let ctx = start(
            &f,
            record("c1")
                .with_precondition(DeclaredPrecondition::in_storage("prod-1").with_slot_content_type("ProductId"))
                .with_precondition(DeclaredPrecondition::in_storage("prod-2").with_slot_content_type("ProductId"))
                .with_precondition(DeclaredPrecondition::in_storage("carrier-7").with_slot_content_type("CarrierId")),
        );

        let Admission::Refused { reason } = f.admission.admit(&ctx).await.unwrap() else {
            panic!("expected refusal");
        };
        assert_eq!(
            reason,
            "Precondition2: Storage entry 'prod-2' not found for target 'ProductId'; \
             Precondition3: Storage entry 'carrier-7' not found for target 'CarrierId'"
        );

        assert!(!f.queue.contains("c1"));
        let refusals = f.publisher.with_category(MessageCategory::Refusal).await;
        assert_eq!(refusals.len(), 1);
        let response: SkillResponse = refusals[0].decode().unwrap();
        assert_eq!(response.action_state, ActionState::Error);
        assert_eq!(response.log_message.as_deref(), Some(reason.as_str()));
        assert_eq!(
            f.publisher.snapshots().await.last().unwrap().reason,
            QueueChange::Remove
        );
    }

    #[tokio::test]
    async fn retry_limit_escalates_to_refusal() {
        let f = fixture(ScriptedMachine::ready("CA-Module").locked(false), Some(1));

        let ctx = start(&f, record("c1"));
        assert!(matches!(
            f.admission.admit(&ctx).await.unwrap(),
            Admission::Requeued { attempts: 1, .. }
        ));

        // second attempt, past the backoff window
        let envelope = f
            .queue
            .try_start_next_at(Utc::now() + chrono::Duration::seconds(10))
            .unwrap();
        let ctx = ExecutionContext::from(&envelope);

        let Admission::Refused { reason } = f.admission.admit(&ctx).await.unwrap() else {
            panic!("expected escalation");
        };
        assert_eq!(
            reason,
            "Preconditions not satisfied after 1 attempts: Lock: Module 'CA-Module' is not locked by this agent."
        );
        assert!(!f.queue.contains("c1"));
    }

    #[tokio::test]
    async fn unknown_machine_is_requeued() {
        let f = fixture(ScriptedMachine::ready("CA-Module"), None);
        let ctx = start(&f, RequestRecord::new("c1", "Retrieve", "Ghost").with_sender("Planner"));

        let admission = f.admission.admit(&ctx).await.unwrap();

        assert!(matches!(admission, Admission::Requeued { attempts: 1, .. }));
        let notice: PreconditionRetry = f.publisher.with_category(MessageCategory::Update).await[0]
            .decode()
            .unwrap();
        assert_eq!(notice.reason, "Coupled: Module 'Ghost' is not registered with this agent.");
    }

    #[tokio::test]
    async fn admit_unknown_conversation_fails() {
        let f = fixture(ScriptedMachine::ready("CA-Module"), None);
        let ctx = start(&f, record("c1"));
        f.queue.try_remove_by_conversation_id("c1");

        assert!(matches!(
            f.admission.admit(&ctx).await,
            Err(SchedulerError::UnknownConversation(id)) if id == "c1"
        ));
    }
}
