//! Human-in-the-loop approval of gated tool calls.

pub mod workflow;

pub use workflow::{ApprovalError, ApprovalOutcome, ApprovalWorkflow};
