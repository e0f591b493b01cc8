//! Run types: the persisted `AgentRun`, its metrics, and the working
//! `AgentState` the scheduler threads through the graph.
//!
//! `AgentState` is fully serializable so a suspended run can be rebuilt
//! from its stored snapshot in a different process.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::MemoryContext;
use crate::message::AgentMessage;

/// Metadata key holding the id of the approval a resumed run was granted.
pub const META_APPROVAL_ID: &str = "approval_id";
/// Metadata key holding the ids of approved tool calls not yet executed.
pub const META_APPROVED_TOOL_CALLS: &str = "approved_tool_call_ids";
/// Metadata key holding the unconsumed `ApprovalGrant`s of a run.
pub const META_APPROVAL_GRANTS: &str = "approval_grants";
/// Metadata key holding the ids of approvals already applied to a run.
pub const META_APPLIED_APPROVALS: &str = "applied_approval_ids";
/// Metadata key holding the action description of the last approval.
pub const META_APPROVED_ACTION: &str = "approved_action";
/// Metadata key holding node/iteration context of a failure.
pub const META_ERROR_CONTEXT: &str = "error_context";
/// Metadata key holding the tool call a suspended run is waiting on.
pub const META_PENDING_APPROVAL: &str = "pending_approval";
/// Metadata key holding the advisory result of the last evaluation hook.
pub const META_EVALUATION: &str = "evaluation";

/// Lifecycle status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    WaitingApproval,
    Completed,
    Failed,
}

impl RunStatus {
    /// Completed and failed runs are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::WaitingApproval => "waiting_approval",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "waiting_approval" => Ok(RunStatus::WaitingApproval),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

/// Position of a run inside the execution graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNode {
    Llm,
    Router,
    Tools,
    End,
}

impl fmt::Display for RunNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunNode::Llm => write!(f, "llm"),
            RunNode::Router => write!(f, "router"),
            RunNode::Tools => write!(f, "tools"),
            RunNode::End => write!(f, "end"),
        }
    }
}

/// Token accounting reported by the language model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Metrics captured over the lifetime of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub tool_calls_count: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub kpi: BTreeMap<String, f64>,
}

impl RunMetrics {
    pub fn started_now() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            token_usage: TokenUsage::default(),
            cost_usd: 0.0,
            tool_calls_count: 0,
            retry_count: 0,
            iterations: 0,
            kpi: BTreeMap::new(),
        }
    }

    /// Stamp the end time and derive the duration.
    pub fn finish(&mut self) {
        let now = Utc::now();
        let elapsed = (now - self.started_at).num_milliseconds().max(0);
        self.ended_at = Some(now);
        self.duration_ms = Some(elapsed as u64);
    }
}

/// A tool invocation requested by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// Audit record of one executed (or refused) tool call. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub run_id: Uuid,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// The value merged into the next LLM turn: output, or `{"error": ..}`.
    pub fn result_value(&self) -> serde_json::Value {
        match (&self.output, &self.error) {
            (_, Some(err)) => serde_json::json!({ "error": err }),
            (Some(out), None) => out.clone(),
            (None, None) => serde_json::Value::Null,
        }
    }
}

/// The tool call a run suspended on, stored in run metadata so any process
/// can open the matching approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
}

/// Sign-off for exactly one tool call. Consumed when that call executes.
///
/// Call ids alone are not unique across turns, so a grant only covers a
/// call with the same id, tool name and input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalGrant {
    pub approval_id: Uuid,
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

impl ApprovalGrant {
    pub fn for_pending(approval_id: Uuid, pending: &PendingApproval) -> Self {
        Self {
            approval_id,
            tool_call_id: pending.tool_call_id.clone(),
            tool_name: pending.tool_name.clone(),
            input: pending.input.clone(),
        }
    }

    pub fn covers(&self, call: &ToolCallRequest) -> bool {
        self.tool_call_id == call.id && self.tool_name == call.tool_name && self.input == call.input
    }
}

/// A persisted agent run, as seen by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub status: RunStatus,
    pub metrics: RunMetrics,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentRun {
    /// The call this run is suspended on, if it is waiting for approval.
    pub fn pending_approval(&self) -> Option<PendingApproval> {
        pending_from(&self.metadata)
    }
}

fn pending_from(metadata: &serde_json::Map<String, serde_json::Value>) -> Option<PendingApproval> {
    metadata
        .get(META_PENDING_APPROVAL)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Working state of one run. Owned by the run while it executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub run_id: Uuid,
    pub agent_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub messages: Vec<AgentMessage>,
    /// Tool calls requested by the last LLM turn and not yet executed.
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCallRequest>,
    /// Results of the last tool turn, keyed by call id.
    #[serde(default)]
    pub tool_results: BTreeMap<String, serde_json::Value>,
    /// Every tool call executed (or refused) during this run.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub memory: MemoryContext,
    pub status: RunStatus,
    pub metrics: RunMetrics,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub iteration: u32,
    pub next_node: RunNode,
}

impl AgentState {
    /// Fresh state for a run that has not started yet.
    pub fn new(
        run_id: Uuid,
        agent_id: Uuid,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        input: impl Into<String>,
        memory: MemoryContext,
    ) -> Self {
        Self {
            run_id,
            agent_id,
            tenant_id,
            user_id,
            input: input.into(),
            output: None,
            error: None,
            messages: Vec::new(),
            pending_tool_calls: Vec::new(),
            tool_results: BTreeMap::new(),
            tool_calls: Vec::new(),
            memory,
            status: RunStatus::Pending,
            metrics: RunMetrics::started_now(),
            metadata: serde_json::Map::new(),
            iteration: 0,
            next_node: RunNode::Llm,
        }
    }

    pub fn last_message(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    /// Ids of approved tool calls that have not run yet.
    pub fn approved_tool_call_ids(&self) -> Vec<String> {
        self.approval_grants()
            .into_iter()
            .map(|grant| grant.tool_call_id)
            .collect()
    }

    /// Unconsumed approval grants, oldest first.
    pub fn approval_grants(&self) -> Vec<ApprovalGrant> {
        self.metadata
            .get(META_APPROVAL_GRANTS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Replace the unconsumed grants and the matching approved call ids.
    pub fn set_approval_grants(&mut self, grants: &[ApprovalGrant]) {
        let ids: Vec<&str> = grants.iter().map(|g| g.tool_call_id.as_str()).collect();
        self.metadata.insert(
            META_APPROVED_TOOL_CALLS.to_string(),
            serde_json::Value::from(ids),
        );
        self.metadata.insert(
            META_APPROVAL_GRANTS.to_string(),
            serde_json::to_value(grants).unwrap_or_default(),
        );
    }

    /// Add a grant and remember its approval as applied.
    pub fn grant_approval(&mut self, grant: ApprovalGrant) {
        let mut applied = self.applied_approval_ids();
        if !applied.contains(&grant.approval_id) {
            applied.push(grant.approval_id);
        }
        self.metadata.insert(
            META_APPLIED_APPROVALS.to_string(),
            serde_json::to_value(&applied).unwrap_or_default(),
        );

        let mut grants = self.approval_grants();
        grants.push(grant);
        self.set_approval_grants(&grants);
    }

    pub fn applied_approval_ids(&self) -> Vec<Uuid> {
        self.metadata
            .get(META_APPLIED_APPROVALS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn is_approval_applied(&self, approval_id: &Uuid) -> bool {
        self.applied_approval_ids().contains(approval_id)
    }

    pub fn pending_approval(&self) -> Option<PendingApproval> {
        pending_from(&self.metadata)
    }

    pub fn set_pending_approval(&mut self, pending: Option<&PendingApproval>) {
        match pending.and_then(|p| serde_json::to_value(p).ok()) {
            Some(value) => {
                self.metadata.insert(META_PENDING_APPROVAL.to_string(), value);
            }
            None => {
                self.metadata.remove(META_PENDING_APPROVAL);
            }
        }
    }

    /// Project the working state onto the caller-facing run record.
    pub fn to_run(&self, created_at: DateTime<Utc>) -> AgentRun {
        AgentRun {
            id: self.run_id,
            agent_id: self.agent_id,
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            input: self.input.clone(),
            output: self.output.clone(),
            error: self.error.clone(),
            status: self.status,
            metrics: self.metrics.clone(),
            metadata: self.metadata.clone(),
            created_at,
            completed_at: self.metrics.ended_at.filter(|_| self.status.is_terminal()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AgentState {
        AgentState::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            None,
            "hello",
            MemoryContext::new(4000),
        )
    }

    #[test]
    fn test_run_status_serde_snake_case() {
        let json = serde_json::to_string(&RunStatus::WaitingApproval).unwrap();
        assert_eq!(json, "\"waiting_approval\"");
        let parsed: RunStatus = "waiting_approval".parse().unwrap();
        assert_eq!(parsed, RunStatus::WaitingApproval);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::WaitingApproval.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_token_usage_accumulate() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.accumulate(&TokenUsage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        });
        assert_eq!(total.prompt_tokens, 13);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 20);
    }

    fn call(id: &str, tool: &str, input: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            tool_name: tool.to_string(),
            input,
        }
    }

    #[test]
    fn test_grant_covers_only_the_exact_call() {
        let pending = PendingApproval {
            tool_call_id: "call_1".to_string(),
            tool_name: "delete_account".to_string(),
            input: serde_json::json!({"account": 1}),
            reason: None,
            rule_id: None,
        };
        let grant = ApprovalGrant::for_pending(Uuid::now_v7(), &pending);

        assert!(grant.covers(&call("call_1", "delete_account", serde_json::json!({"account": 1}))));
        assert!(!grant.covers(&call("call_1", "delete_account", serde_json::json!({"account": 2}))));
        assert!(!grant.covers(&call("call_1", "refund", serde_json::json!({"account": 1}))));
        assert!(!grant.covers(&call("call_2", "delete_account", serde_json::json!({"account": 1}))));
    }

    #[test]
    fn test_grants_track_applied_approvals() {
        let mut state = test_state();
        let approval_id = Uuid::now_v7();
        assert!(state.approved_tool_call_ids().is_empty());
        assert!(!state.is_approval_applied(&approval_id));

        state.grant_approval(ApprovalGrant {
            approval_id,
            tool_call_id: "call_1".to_string(),
            tool_name: "refund".to_string(),
            input: serde_json::json!({}),
        });
        assert_eq!(state.approved_tool_call_ids(), vec!["call_1"]);
        assert!(state.is_approval_applied(&approval_id));

        state.set_approval_grants(&[]);
        assert!(state.approved_tool_call_ids().is_empty());
        assert_eq!(state.metadata[META_APPROVED_TOOL_CALLS], serde_json::json!([]));
        assert!(state.is_approval_applied(&approval_id));
    }

    #[test]
    fn test_tool_call_record_result_value() {
        let mut record = ToolCallRecord {
            id: "c1".to_string(),
            run_id: Uuid::now_v7(),
            tool_name: "search".to_string(),
            input: serde_json::json!({"q": "rust"}),
            output: Some(serde_json::json!({"hits": 3})),
            error: None,
            approved: false,
            created_at: Utc::now(),
        };
        assert_eq!(record.result_value()["hits"], 3);

        record.error = Some("boom".to_string());
        assert_eq!(record.result_value()["error"], "boom");
    }

    #[test]
    fn test_to_run_sets_completed_at_only_when_terminal() {
        let mut state = test_state();
        state.status = RunStatus::WaitingApproval;
        state.metrics.finish();
        let run = state.to_run(Utc::now());
        assert!(run.completed_at.is_none());

        state.status = RunStatus::Completed;
        let run = state.to_run(Utc::now());
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_pending_approval_round_trips_through_run() {
        let mut state = test_state();
        let pending = PendingApproval {
            tool_call_id: "call_3".to_string(),
            tool_name: "refund".to_string(),
            input: serde_json::json!({"amount": 900}),
            reason: Some("Approval required for: refunds".to_string()),
            rule_id: None,
        };
        state.set_pending_approval(Some(&pending));
        assert_eq!(state.to_run(Utc::now()).pending_approval(), Some(pending));

        state.set_pending_approval(None);
        assert!(state.to_run(Utc::now()).pending_approval().is_none());
    }

    #[test]
    fn test_state_snapshot_survives_json() {
        let mut state = test_state();
        state.next_node = RunNode::Tools;
        state.pending_tool_calls.push(ToolCallRequest {
            id: "call_9".to_string(),
            tool_name: "delete_account".to_string(),
            input: serde_json::json!({"account": 42}),
        });
        let json = serde_json::to_string(&state).unwrap();
        let restored: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_node, RunNode::Tools);
        assert_eq!(restored.pending_tool_calls[0].id, "call_9");
    }
}
