//! Probes into the machines this agent executes on.
//!
//! Machine I/O (coupling, skill state reads, storage reads) lives outside the
//! scheduler. It only sees these traits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("machine unreachable: {0}")]
    Unavailable(String),

    #[error("probe failed: {0}")]
    Failed(String),
}

/// Observed state of a machine skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillState {
    Idle,
    Starting,
    Running,
    Suspended,
    Halted,
    Completed,
    Error,
}

impl SkillState {
    /// Parse a state name reported by the machine, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "idle" | "ready" => Some(Self::Idle),
            "starting" => Some(Self::Starting),
            "running" | "executing" => Some(Self::Running),
            "suspended" => Some(Self::Suspended),
            "halted" | "halting" | "aborted" => Some(Self::Halted),
            "completed" | "done" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SkillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Suspended => "Suspended",
            Self::Halted => "Halted",
            Self::Completed => "Completed",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Lookup passed to a storage unit. Unset fields are not matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageQuery {
    pub product_id: Option<String>,
    pub product_type: Option<String>,
    pub carrier_id: Option<String>,
    pub carrier_type: Option<String>,
}

/// One storage unit (slot set) of a machine.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Whether any slot matches the query.
    async fn contains(&self, query: &StorageQuery) -> Result<bool, ProbeError>;
}

/// Readiness facts of one machine.
#[async_trait]
pub trait MachineProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Port/skill session established.
    async fn is_coupled(&self) -> Result<bool, ProbeError>;

    /// State of the machine's startup skill, `None` if it has none or it cannot be read.
    async fn startup_skill_state(&self) -> Result<Option<SkillState>, ProbeError>;

    /// Whether this agent currently holds the machine lock. Read only, never claimed.
    async fn is_locked_by_us(&self) -> Result<bool, ProbeError>;

    fn storages(&self) -> Vec<Arc<dyn StorageProbe>>;
}

/// Resolves machine names to probes.
pub trait MachineDirectory: Send + Sync {
    fn machine(&self, name: &str) -> Option<Arc<dyn MachineProbe>>;
}

/// Fixed name -> probe map.
#[derive(Default, Clone)]
pub struct MachineRegistry {
    machines: HashMap<String, Arc<dyn MachineProbe>>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe under its own name, replacing any previous one.
    pub fn register(&mut self, machine: Arc<dyn MachineProbe>) {
        self.machines.insert(machine.name().to_string(), machine);
    }

    pub fn with(mut self, machine: Arc<dyn MachineProbe>) -> Self {
        self.register(machine);
        self
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

impl MachineDirectory for MachineRegistry {
    fn machine(&self, name: &str) -> Option<Arc<dyn MachineProbe>> {
        self.machines.get(name).cloned()
    }
}

impl<T: MachineDirectory + ?Sized> MachineDirectory for Arc<T> {
    fn machine(&self, name: &str) -> Option<Arc<dyn MachineProbe>> {
        (**self).machine(name)
    }
}
