//! Topic layout for module agents.
//!
//! `/{namespace}/{module_id}/{module_id}_{role}/{suffix}`. The namespace may
//! be nested (`Factory/_PHUKET`) and is left out entirely when blank; an
//! empty role collapses the sub-agent segment to the module id.

use floorline_core::AgentSection;

pub const SKILL_REQUEST: &str = "SkillRequest";
pub const SKILL_RESPONSE: &str = "SkillResponse";
pub const ACTION_QUEUE: &str = "ActionQueue";

/// Builds the topic paths of one module agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    namespace_path: String,
    module_id: String,
    sub_agent: String,
}

impl TopicScheme {
    pub fn new(namespace: &str, module_id: impl Into<String>, role: &str) -> Self {
        let module_id = module_id.into();
        let parts: Vec<&str> = namespace.split('/').filter(|p| !p.trim().is_empty()).collect();
        let namespace_path = if parts.is_empty() {
            String::new()
        } else {
            format!("/{}", parts.join("/"))
        };
        let role = role.trim();
        let sub_agent = if role.is_empty() {
            module_id.clone()
        } else {
            format!("{module_id}_{role}")
        };
        Self {
            namespace_path,
            module_id,
            sub_agent,
        }
    }

    pub fn from_agent(agent: &AgentSection) -> Self {
        Self::new(&agent.namespace, agent.module_id.clone(), &agent.role)
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Topic for an arbitrary suffix under this agent.
    pub fn topic(&self, suffix: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.namespace_path, self.module_id, self.sub_agent, suffix
        )
    }

    /// Namespace-level topic, outside any agent.
    pub fn namespace_topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.namespace_path, suffix)
    }

    pub fn skill_request(&self) -> String {
        self.topic(SKILL_REQUEST)
    }

    pub fn skill_response(&self) -> String {
        self.topic(SKILL_RESPONSE)
    }

    pub fn action_queue(&self) -> String {
        self.topic(ACTION_QUEUE)
    }
}
