use floorline_core::{ActionState, InputParameters};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer to a skill request.
///
/// Optional parts are filled by category: consent echoes the input
/// parameters, refusal/failure carry `log_message`, DONE carries the result
/// data and the execution counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResponse {
    pub action_state: ActionState,
    /// Lowercase state name.
    pub status: String,
    pub action_title: String,
    pub machine_name: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub input_parameters: Option<InputParameters>,
    #[serde(default)]
    pub final_result_data: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub log_message: Option<String>,
    #[serde(default)]
    pub successful_executions_count: Option<i64>,
}

impl SkillResponse {
    pub fn new(
        state: ActionState,
        action_title: impl Into<String>,
        machine_name: impl Into<String>,
    ) -> Self {
        Self {
            action_state: state,
            status: state.status_label().to_string(),
            action_title: action_title.into(),
            machine_name: machine_name.into(),
            step: None,
            input_parameters: None,
            final_result_data: None,
            log_message: None,
            successful_executions_count: None,
        }
    }
}
