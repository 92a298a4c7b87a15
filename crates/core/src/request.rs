//! Materialized skill requests as handed over by the message-parsing layer.

use serde::{Deserialize, Serialize};

use crate::action::{ActionModel, ActionState};
use crate::params::InputParameters;

/// A precondition as declared on the requested action, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclaredPrecondition {
    /// Element name of the precondition; used as the condition id when present.
    #[serde(default)]
    pub id_short: Option<String>,
    /// e.g. `InStorage`.
    #[serde(default)]
    pub condition_type: String,
    #[serde(default)]
    pub condition_value: Option<String>,
    /// e.g. `ProductId`, `CarrierType`.
    #[serde(default)]
    pub slot_content_type: Option<String>,
}

impl DeclaredPrecondition {
    pub fn in_storage(value: impl Into<String>) -> Self {
        Self {
            id_short: None,
            condition_type: "InStorage".into(),
            condition_value: Some(value.into()),
            slot_content_type: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id_short = Some(id.into());
        self
    }

    pub fn with_slot_content_type(mut self, target: impl Into<String>) -> Self {
        self.slot_content_type = Some(target.into());
        self
    }
}

/// Typed view of an inbound request.
///
/// Implemented by whatever decodes the wire format; the scheduler only reads
/// requests through this trait.
pub trait InboundRequest {
    fn conversation_id(&self) -> &str;
    fn sender_id(&self) -> &str;
    fn receiver_id(&self) -> &str;
    fn action_id(&self) -> &str;
    fn action_title(&self) -> &str;
    fn machine_name(&self) -> &str;
    fn status(&self) -> &str;
    fn input_parameters(&self) -> &InputParameters;
    fn declared_preconditions(&self) -> &[DeclaredPrecondition];

    /// Build the action model carried alongside the queued request.
    fn action_model(&self) -> ActionModel {
        ActionModel {
            action_id: self.action_id().to_string(),
            action_title: self.action_title().to_string(),
            machine_name: self.machine_name().to_string(),
            status: ActionState::normalize(self.status()),
            preconditions: self.declared_preconditions().to_vec(),
        }
    }
}

/// Plain request record, the serde form carried on the bus.
///
/// Every field defaults so that incomplete records still decode; the
/// ingestor decides whether a record is usable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub action_title: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub input_parameters: InputParameters,
    #[serde(default)]
    pub preconditions: Vec<DeclaredPrecondition>,
}

impl RequestRecord {
    pub fn new(
        conversation_id: impl Into<String>,
        action_title: impl Into<String>,
        machine_name: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            action_title: action_title.into(),
            machine_name: machine_name.into(),
            status: ActionState::Planned.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    pub fn with_receiver(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = receiver_id.into();
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.input_parameters.insert(key, value);
        self
    }

    pub fn with_precondition(mut self, precondition: DeclaredPrecondition) -> Self {
        self.preconditions.push(precondition);
        self
    }
}

impl InboundRequest for RequestRecord {
    fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
    fn sender_id(&self) -> &str {
        &self.sender_id
    }
    fn receiver_id(&self) -> &str {
        &self.receiver_id
    }
    fn action_id(&self) -> &str {
        &self.action_id
    }
    fn action_title(&self) -> &str {
        &self.action_title
    }
    fn machine_name(&self) -> &str {
        &self.machine_name
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn input_parameters(&self) -> &InputParameters {
        &self.input_parameters
    }
    fn declared_preconditions(&self) -> &[DeclaredPrecondition] {
        &self.preconditions
    }
}
