pub mod action;
pub mod config;
pub mod error;
pub mod params;
pub mod request;

pub use action::{ActionModel, ActionState, QueueState};
pub use config::{load_dotenv, AgentConfig, AgentSection, BackoffStrategy, BusSettings, SchedulerSettings};
pub use error::CoreError;
pub use params::InputParameters;
pub use request::{DeclaredPrecondition, InboundRequest, RequestRecord};
