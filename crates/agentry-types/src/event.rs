//! Run lifecycle events broadcast on the engine's event bus.
//!
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        agent_id: Uuid,
    },

    /// A language-model turn finished.
    LlmTurnCompleted {
        run_id: Uuid,
        iteration: u32,
        tool_calls_requested: usize,
        total_tokens: u32,
    },

    ToolExecuted {
        run_id: Uuid,
        tool_call_id: String,
        tool_name: String,
        success: bool,
    },

    /// The run suspended waiting for a human decision.
    ApprovalRequired {
        run_id: Uuid,
        tool_call_id: String,
        tool_name: String,
        reason: Option<String>,
    },

    ApprovalResolved {
        run_id: Uuid,
        approval_id: Uuid,
        approved: bool,
    },

    RunCompleted {
        run_id: Uuid,
        total_tokens: u32,
        duration_ms: u64,
    },

    RunFailed {
        run_id: Uuid,
        error: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::LlmTurnCompleted { run_id, .. }
            | RunEvent::ToolExecuted { run_id, .. }
            | RunEvent::ApprovalRequired { run_id, .. }
            | RunEvent::ApprovalResolved { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}
