use std::fmt;

use serde::{Deserialize, Serialize};

use crate::request::DeclaredPrecondition;

/// Action state vocabulary shared with planning agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Open,
    Planned,
    Executing,
    Suspended,
    Done,
    Aborted,
    Error,
}

impl ActionState {
    /// Map a raw state string onto the vocabulary.
    ///
    /// Exact names match case-insensitively. Skill-side synonyms are folded
    /// (`COMPLETED` → `DONE`, `RUNNING`/`STARTING` → `EXECUTING`,
    /// `HALTED` → `ABORTED`, `READY` → `PLANNED`). Anything else is `OPEN`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Self::Open,
            "PLANNED" | "READY" => Self::Planned,
            "EXECUTING" | "RUNNING" | "STARTING" => Self::Executing,
            "SUSPENDED" => Self::Suspended,
            "DONE" | "COMPLETED" => Self::Done,
            "ABORTED" | "HALTED" => Self::Aborted,
            "ERROR" => Self::Error,
            _ => Self::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Planned => "PLANNED",
            Self::Executing => "EXECUTING",
            Self::Suspended => "SUSPENDED",
            Self::Done => "DONE",
            Self::Aborted => "ABORTED",
            Self::Error => "ERROR",
        }
    }

    /// Lowercase form carried in the response `status` field.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Planned => "planned",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Done => "done",
            Self::Aborted => "aborted",
            Self::Error => "error",
        }
    }

    /// Terminal states remove the request from the execution queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Error)
    }
}

impl From<&str> for ActionState {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling state of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueState {
    Pending,
    Running,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action a planning agent asked this module to perform.
///
/// Opaque to the scheduler apart from the declared preconditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionModel {
    pub action_id: String,
    pub action_title: String,
    pub machine_name: String,
    pub status: ActionState,
    #[serde(default)]
    pub preconditions: Vec<DeclaredPrecondition>,
}
