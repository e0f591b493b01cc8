pub mod agent;

pub use agent::{AgentService, ServiceError};
