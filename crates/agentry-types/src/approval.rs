//! Human-in-the-loop approval records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of an approval. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("invalid approval status: '{other}'")),
        }
    }
}

/// A request for human sign-off on one pending tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub run_id: Uuid,
    pub tool_call_id: String,
    /// Human-readable description of the gated action.
    pub action: String,
    pub context: serde_json::Value,
    pub status: ApprovalStatus,
    pub requested_by: Option<Uuid>,
    /// The user the request is addressed to.
    pub approver_id: Option<Uuid>,
    pub resolved_by: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Approval {
    pub fn pending(
        run_id: Uuid,
        tool_call_id: impl Into<String>,
        action: impl Into<String>,
        context: serde_json::Value,
        requested_by: Option<Uuid>,
        approver_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_id,
            tool_call_id: tool_call_id.into(),
            action: action.into(),
            context,
            status: ApprovalStatus::Pending,
            requested_by,
            approver_id,
            resolved_by: None,
            requested_at: Utc::now(),
            resolved_at: None,
            rejection_reason: None,
        }
    }
}

/// Terminal decision applied to a pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject { reason: Option<String> },
}

impl ApprovalDecision {
    pub fn status(&self) -> ApprovalStatus {
        match self {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject { .. } => ApprovalStatus::Rejected,
        }
    }
}
