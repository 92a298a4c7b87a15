use tracing::{debug, warn};

use super::descriptor::{ConditionKind, PreconditionDescriptor};
use super::report::{GatePhase, PreconditionReport};
use crate::envelope::RequestEnvelope;
use crate::machine::{MachineProbe, ProbeError, SkillState};

/// Two-phase admission check for one request on one machine.
///
/// Readiness (coupled, startup skill running, lock owned) is checked first and
/// every failing gate is reported. Declared preconditions are only evaluated
/// on a ready machine; each one is evaluated on its own so the report lists
/// all of them. Probe errors count as "not satisfied".
#[derive(Debug, Clone, Copy, Default)]
pub struct PreconditionGate;

impl PreconditionGate {
    pub fn new() -> Self {
        Self
    }

    pub async fn evaluate(
        &self,
        machine: &dyn MachineProbe,
        envelope: Option<&RequestEnvelope>,
    ) -> PreconditionReport {
        let mut report = PreconditionReport::new();

        self.check_readiness(machine, &mut report).await;
        if !report.is_satisfied() {
            debug!(machine = %machine.name(), failures = report.failures().len(), "machine not ready");
            return report;
        }

        if let Some(envelope) = envelope {
            let descriptors = PreconditionDescriptor::parse_all(&envelope.action_model.preconditions);
            self.check_declared(machine, &descriptors, &mut report).await;
        }
        report
    }

    /// Report for a machine name the agent has no probe for.
    pub fn unknown_machine(&self, name: &str) -> PreconditionReport {
        let mut report = PreconditionReport::new();
        report.add_failure(
            GatePhase::Readiness,
            "Coupled",
            &format!("Module '{name}' is not registered with this agent."),
        );
        report
    }

    async fn check_readiness(&self, machine: &dyn MachineProbe, report: &mut PreconditionReport) {
        let name = machine.name();
        let (coupled, startup, locked) = futures::join!(
            machine.is_coupled(),
            machine.startup_skill_state(),
            machine.is_locked_by_us()
        );

        if !probe_ok(name, "coupled", coupled) {
            report.add_failure(
                GatePhase::Readiness,
                "Coupled",
                &format!("Module '{name}' is not coupled."),
            );
        }

        let startup_running = match startup {
            Ok(state) => state == Some(SkillState::Running),
            Err(e) => {
                warn!(machine = %name, error = %e, "startup skill probe failed");
                false
            }
        };
        if !startup_running {
            report.add_failure(
                GatePhase::Readiness,
                "StartupSkill",
                &format!("Startup skill on module '{name}' is not running."),
            );
        }

        if !probe_ok(name, "lock", locked) {
            report.add_failure(
                GatePhase::Readiness,
                "Lock",
                &format!("Module '{name}' is not locked by this agent."),
            );
        }
    }

    async fn check_declared(
        &self,
        machine: &dyn MachineProbe,
        descriptors: &[PreconditionDescriptor],
        report: &mut PreconditionReport,
    ) {
        for descriptor in descriptors {
            match descriptor.kind {
                ConditionKind::InStorage => {
                    if !self.in_storage(machine, descriptor).await {
                        report.add_failure(
                            GatePhase::Declared,
                            &descriptor.condition_id,
                            &format!(
                                "Storage entry '{}' not found for target '{}'",
                                descriptor.display_value(),
                                descriptor.target
                            ),
                        );
                    }
                }
                ConditionKind::Unknown => {
                    debug!(condition = %descriptor.condition_id, "unsupported precondition type ignored");
                }
            }
        }
    }

    async fn in_storage(&self, machine: &dyn MachineProbe, descriptor: &PreconditionDescriptor) -> bool {
        let storages = machine.storages();
        if storages.is_empty() {
            warn!(machine = %machine.name(), condition = %descriptor.condition_id, "machine has no storages");
            return false;
        }
        let Some(query) = descriptor.storage_query() else {
            warn!(condition = %descriptor.condition_id, "condition has no value");
            return false;
        };

        for storage in storages {
            match storage.contains(&query).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    debug!(storage = %storage.name(), error = %e, "storage lookup failed");
                }
            }
        }
        false
    }
}

fn probe_ok(machine: &str, probe: &str, result: Result<bool, ProbeError>) -> bool {
    result.unwrap_or_else(|e| {
        warn!(machine = %machine, probe, error = %e, "readiness probe failed");
        false
    })
}
