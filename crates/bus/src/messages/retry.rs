use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notice sent to the requester when its request was pushed back because the
/// machine was not ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreconditionRetry {
    pub action_state: String,
    pub action_title: String,
    pub machine_name: String,
    /// First readiness failure.
    pub reason: String,
    pub attempts: u32,
    pub next_retry_at_utc: Option<DateTime<Utc>>,
}

impl PreconditionRetry {
    pub const ACTION_STATE: &'static str = "PRECONDITION_RETRY";

    pub fn new(
        action_title: impl Into<String>,
        machine_name: impl Into<String>,
        reason: impl Into<String>,
        attempts: u32,
        next_retry_at_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            action_state: Self::ACTION_STATE.to_string(),
            action_title: action_title.into(),
            machine_name: machine_name.into(),
            reason: reason.into(),
            attempts,
            next_retry_at_utc,
        }
    }
}
