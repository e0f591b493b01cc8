//! Shared domain types for Agentry.
//!
//! Runs, agent state, memory, approvals, policies, personas and the
//! error enums shared by the engine and its adapters.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod approval;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod llm;
pub mod memory;
pub mod message;
pub mod persona;
pub mod policy;
pub mod run;
pub mod user;
