/// Which gate phase produced the failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Coupling, startup skill, or lock ownership.
    Readiness,
    /// Per-request declared preconditions.
    Declared,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreconditionReport {
    failures: Vec<String>,
    failed_phase: Option<GatePhase>,
}

impl PreconditionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_satisfied(&self) -> bool {
        self.failures.is_empty()
    }

    /// `"<category>: <message>"` in evaluation order.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn failed_phase(&self) -> Option<GatePhase> {
        self.failed_phase
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.failures.first().map(String::as_str)
    }

    /// All failures on one line.
    pub fn summary(&self) -> String {
        self.failures.join("; ")
    }

    pub(crate) fn add_failure(&mut self, phase: GatePhase, category: &str, message: &str) {
        let category = match category.trim() {
            "" => "Precondition",
            c => c,
        };
        self.failures.push(format!("{category}: {message}"));
        self.failed_phase.get_or_insert(phase);
    }
}
