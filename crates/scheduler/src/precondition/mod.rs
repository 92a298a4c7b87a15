//! Readiness and declared-precondition evaluation.

mod descriptor;
mod gate;
mod report;

pub use descriptor::{ConditionKind, ConditionTarget, PreconditionDescriptor};
pub use gate::PreconditionGate;
pub use report::{GatePhase, PreconditionReport};
