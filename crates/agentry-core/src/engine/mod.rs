//! Run scheduler for agent runs.
//!
//! A run walks the `llm -> router -> tools -> llm` graph until the router
//! ends it, the iteration cap is hit, or a tool call needs human sign-off.

pub mod error;
pub mod format;
pub mod graph;
pub mod pricing;
pub mod scheduler;

pub use error::EngineError;
pub use graph::transition;
pub use scheduler::{AgentRuntime, RunScheduler};
