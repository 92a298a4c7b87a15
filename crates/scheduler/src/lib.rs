//! Per-module skill execution scheduler.
//!
//! Requests arrive on the module's skill-request topic, wait in a bounded
//! FIFO [`ExecutionQueue`], and are handed to the executor one tick at a time
//! once the machine is lock-owned and its preconditions hold. Every queue
//! change is broadcast; completions go back to the requester through the
//! [`ResponseEmitter`].

pub mod admission;
pub mod backoff;
pub mod broadcaster;
pub mod emitter;
pub mod envelope;
pub mod error;
pub mod ingestor;
pub mod machine;
pub mod precondition;
pub mod queue;
pub mod scheduler;
pub mod session;

#[cfg(test)]
mod testing;

pub use admission::{Admission, AdmissionController};
pub use backoff::BackoffPolicy;
pub use broadcaster::{build_snapshot, StateBroadcaster};
pub use emitter::{
    successful_executions_from, EmitOutcome, ResponseEmitter, ResponseKind, ResponseSignal,
    Suppression,
};
pub use envelope::RequestEnvelope;
pub use error::{IngestError, SchedulerError};
pub use ingestor::{ExecutionContext, PollOutcome, RequestIngestor};
pub use machine::{
    MachineDirectory, MachineProbe, MachineRegistry, ProbeError, SkillState, StorageProbe,
    StorageQuery,
};
pub use precondition::{
    ConditionKind, ConditionTarget, GatePhase, PreconditionDescriptor, PreconditionGate,
    PreconditionReport,
};
pub use queue::ExecutionQueue;
pub use scheduler::ModuleScheduler;
pub use session::SessionTable;
