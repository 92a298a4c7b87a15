use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ──────────────────────────────────────────

/// Configuration of one module execution agent.
///
/// Parsed from TOML, then `FLOORLINE_*` environment variables override
/// individual keys, then the result is validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSection,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub bus: BusSettings,
}

// ── Section configs ─────────────────────────────────────────────

/// Identity of the agent and the module it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Module this agent executes skills on (e.g. `P102`).
    pub module_id: String,

    /// Agent id used as response sender. Defaults to `<module_id>_Execution_Agent`.
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Sub-agent role used in topic paths.
    #[serde(default = "default_role")]
    pub role: String,

    /// Topic namespace, may be nested (`Factory/_PHUKET`).
    #[serde(default)]
    pub namespace: String,
}

fn default_role() -> String {
    "ExecutionHolon".into()
}

impl AgentSection {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            agent_id: None,
            role: default_role(),
            namespace: String::new(),
        }
    }

    /// Resolved agent id.
    pub fn agent_id(&self) -> String {
        self.agent_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}_Execution_Agent", self.module_id))
    }
}

/// How the retry delay grows for requests whose machine is not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Every retry waits the initial backoff.
    #[default]
    Constant,
    /// Initial backoff doubled per prior attempt, capped at the max backoff.
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => f.write_str("constant"),
            Self::Exponential => f.write_str("exponential"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "exponential" => Ok(Self::Exponential),
            other => Err(CoreError::Config(format!(
                "invalid backoff strategy '{other}', expected 'constant' or 'exponential'"
            ))),
        }
    }
}

/// Execution queue and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Maximum queued requests. 0 = unbounded.
    #[serde(default)]
    pub queue_capacity: usize,

    /// Delay before a not-ready request becomes eligible again.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Upper bound for exponential backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Readiness requeues allowed before the request is refused. None = unlimited.
    #[serde(default)]
    pub max_precondition_retries: Option<u32>,
}

fn default_initial_backoff_ms() -> u64 {
    5_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff: BackoffStrategy::default(),
            max_backoff_ms: default_max_backoff_ms(),
            max_precondition_retries: None,
        }
    }
}

impl SchedulerSettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Bus endpoints the agent connects to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSettings {
    /// Broker frontend, where this agent publishes.
    #[serde(default = "default_publish_endpoint")]
    pub publish_endpoint: String,

    /// Broker backend, where this agent subscribes.
    #[serde(default = "default_subscribe_endpoint")]
    pub subscribe_endpoint: String,
}

fn default_publish_endpoint() -> String {
    "tcp://127.0.0.1:5555".into()
}

fn default_subscribe_endpoint() -> String {
    "tcp://127.0.0.1:5556".into()
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            publish_endpoint: default_publish_endpoint(),
            subscribe_endpoint: default_subscribe_endpoint(),
        }
    }
}

// ── Loading & Validation ────────────────────────────────────────

impl AgentConfig {
    /// Config with defaults for everything but the module id.
    pub fn for_module(module_id: impl Into<String>) -> Self {
        Self {
            agent: AgentSection::new(module_id),
            scheduler: SchedulerSettings::default(),
            bus: BusSettings::default(),
        }
    }

    /// Parse config from a TOML string, applying process environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        Self::from_toml_with(toml_str, |key| env::var(key).ok())
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse config using `lookup` as the environment.
    pub fn from_toml_with<F>(toml_str: &str, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply `FLOORLINE_*` overrides.
    ///
    /// - `FLOORLINE_MODULE_ID` -> `agent.module_id`
    /// - `FLOORLINE_AGENT_ID` -> `agent.agent_id`
    /// - `FLOORLINE_ROLE` -> `agent.role`
    /// - `FLOORLINE_NAMESPACE` -> `agent.namespace`
    /// - `FLOORLINE_QUEUE_CAPACITY` -> `scheduler.queue_capacity`
    /// - `FLOORLINE_INITIAL_BACKOFF_MS` -> `scheduler.initial_backoff_ms`
    /// - `FLOORLINE_BACKOFF` -> `scheduler.backoff`
    /// - `FLOORLINE_MAX_BACKOFF_MS` -> `scheduler.max_backoff_ms`
    /// - `FLOORLINE_MAX_PRECONDITION_RETRIES` -> `scheduler.max_precondition_retries`
    /// - `FLOORLINE_BUS_PUBLISH` -> `bus.publish_endpoint`
    /// - `FLOORLINE_BUS_SUBSCRIBE` -> `bus.subscribe_endpoint`
    ///
    /// Unparseable numbers are ignored; an unknown backoff strategy is an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FLOORLINE_MODULE_ID") {
            self.agent.module_id = v;
        }
        if let Some(v) = get("FLOORLINE_AGENT_ID") {
            self.agent.agent_id = Some(v);
        }
        if let Some(v) = get("FLOORLINE_ROLE") {
            self.agent.role = v;
        }
        if let Some(v) = get("FLOORLINE_NAMESPACE") {
            self.agent.namespace = v;
        }
        if let Some(v) = get("FLOORLINE_QUEUE_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                self.scheduler.queue_capacity = n;
            }
        }
        if let Some(v) = get("FLOORLINE_INITIAL_BACKOFF_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.scheduler.initial_backoff_ms = n;
            }
        }
        if let Some(v) = get("FLOORLINE_BACKOFF") {
            self.scheduler.backoff = v.parse()?;
        }
        if let Some(v) = get("FLOORLINE_MAX_BACKOFF_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.scheduler.max_backoff_ms = n;
            }
        }
        if let Some(v) = get("FLOORLINE_MAX_PRECONDITION_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.scheduler.max_precondition_retries = Some(n);
            }
        }
        if let Some(v) = get("FLOORLINE_BUS_PUBLISH") {
            self.bus.publish_endpoint = v;
        }
        if let Some(v) = get("FLOORLINE_BUS_SUBSCRIBE") {
            self.bus.subscribe_endpoint = v;
        }
        Ok(())
    }

    /// Validate identity and retry settings.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.agent.module_id.trim().is_empty() {
            return Err(CoreError::Config("agent.module_id must not be empty".into()));
        }
        if self.agent.role.trim().is_empty() {
            return Err(CoreError::Config("agent.role must not be empty".into()));
        }
        if self.scheduler.initial_backoff_ms == 0 {
            return Err(CoreError::Config(
                "scheduler.initial_backoff_ms must be greater than zero".into(),
            ));
        }
        if self.scheduler.max_backoff_ms < self.scheduler.initial_backoff_ms {
            return Err(CoreError::Config(format!(
                "scheduler.max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.scheduler.max_backoff_ms, self.scheduler.initial_backoff_ms
            )));
        }
        for (name, endpoint) in [
            ("bus.publish_endpoint", &self.bus.publish_endpoint),
            ("bus.subscribe_endpoint", &self.bus.subscribe_endpoint),
        ] {
            if !(endpoint.starts_with("tcp://") || endpoint.starts_with("ipc://")) {
                return Err(CoreError::Config(format!(
                    "{name} '{endpoint}' must start with tcp:// or ipc://"
                )));
            }
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded for module {}:", self.agent.module_id);
        tracing::info!("  agent:     id={}, role={}, namespace={}", self.agent.agent_id(), self.agent.role, self.agent.namespace);
        tracing::info!(
            "  scheduler: capacity={}, backoff={} ({}ms..{}ms), max_retries={:?}",
            self.scheduler.queue_capacity,
            self.scheduler.backoff,
            self.scheduler.initial_backoff_ms,
            self.scheduler.max_backoff_ms,
            self.scheduler.max_precondition_retries
        );
        tracing::info!("  bus:       publish={}, subscribe={}", self.bus.publish_endpoint, self.bus.subscribe_endpoint);
    }
}
