//! Process-local implementation of every repository trait.
//!
//! Backed by `DashMap`s. Used by tests and by single-process embeddings that
//! do not need runs to survive a restart.

use agentry_types::agent::AgentDefinition;
use agentry_types::approval::{Approval, ApprovalDecision, ApprovalStatus};
use agentry_types::error::RepositoryError;
use agentry_types::evaluation::KpiSnapshot;
use agentry_types::memory::MemoryContext;
use agentry_types::run::{AgentRun, AgentState, RunStatus, ToolCallRecord};
use agentry_types::user::User;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    AgentRepository, ApprovalRepository, KpiRepository, MemoryRepository, RunRepository,
    UserRepository,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    agents: DashMap<Uuid, AgentDefinition>,
    runs: DashMap<Uuid, AgentRun>,
    states: DashMap<Uuid, AgentState>,
    tool_calls: DashMap<Uuid, Vec<ToolCallRecord>>,
    approvals: DashMap<Uuid, Approval>,
    memories: DashMap<Uuid, MemoryContext>,
    users: DashMap<Uuid, User>,
    kpis: DashMap<Uuid, Vec<KpiSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentRepository for InMemoryStore {
    async fn save_agent(&self, agent: &AgentDefinition) -> Result<(), RepositoryError> {
        self.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &Uuid) -> Result<Option<AgentDefinition>, RepositoryError> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn list_agents(
        &self,
        tenant_id: Option<&Uuid>,
    ) -> Result<Vec<AgentDefinition>, RepositoryError> {
        let mut agents: Vec<AgentDefinition> = self
            .agents
            .iter()
            .filter(|a| tenant_id.is_none_or(|t| a.tenant_id == *t))
            .map(|a| a.clone())
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }
}

impl RunRepository for InMemoryStore {
    async fn create_run(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        if self.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("run {} already exists", run.id)));
        }
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        let mut stored = self.runs.get_mut(&run.id).ok_or(RepositoryError::NotFound)?;
        if stored.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "run {} is already {}",
                run.id, stored.status
            )));
        }
        *stored = run.clone();
        Ok(())
    }

    async fn transition_run(
        &self,
        run: &AgentRun,
        expected: RunStatus,
    ) -> Result<bool, RepositoryError> {
        let mut stored = self.runs.get_mut(&run.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = run.clone();
        Ok(true)
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<AgentRun>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn list_runs_by_agent(
        &self,
        agent_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AgentRun>, RepositoryError> {
        let mut runs: Vec<AgentRun> = self
            .runs
            .iter()
            .filter(|r| r.agent_id == *agent_id)
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn save_state(&self, state: &AgentState) -> Result<(), RepositoryError> {
        self.states.insert(state.run_id, state.clone());
        Ok(())
    }

    async fn load_state(&self, run_id: &Uuid) -> Result<Option<AgentState>, RepositoryError> {
        Ok(self.states.get(run_id).map(|s| s.clone()))
    }

    async fn record_tool_call(&self, record: &ToolCallRecord) -> Result<(), RepositoryError> {
        self.tool_calls
            .entry(record.run_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_tool_calls(&self, run_id: &Uuid) -> Result<Vec<ToolCallRecord>, RepositoryError> {
        Ok(self
            .tool_calls
            .get(run_id)
            .map(|calls| calls.clone())
            .unwrap_or_default())
    }
}

impl ApprovalRepository for InMemoryStore {
    async fn create_approval(&self, approval: &Approval) -> Result<(), RepositoryError> {
        self.approvals.insert(approval.id, approval.clone());
        Ok(())
    }

    async fn get_approval(&self, id: &Uuid) -> Result<Option<Approval>, RepositoryError> {
        Ok(self.approvals.get(id).map(|a| a.clone()))
    }

    async fn resolve_approval(
        &self,
        id: &Uuid,
        decision: &ApprovalDecision,
        resolved_by: &Uuid,
    ) -> Result<Option<Approval>, RepositoryError> {
        // The shard lock held by get_mut makes check-and-set atomic.
        let Some(mut approval) = self.approvals.get_mut(id) else {
            return Ok(None);
        };
        if approval.status != ApprovalStatus::Pending {
            return Ok(None);
        }

        approval.status = decision.status();
        approval.resolved_by = Some(*resolved_by);
        approval.resolved_at = Some(Utc::now());
        if let ApprovalDecision::Reject { reason } = decision {
            approval.rejection_reason = reason.clone();
        }
        Ok(Some(approval.clone()))
    }

    async fn list_pending_approvals(
        &self,
        approver_id: Option<&Uuid>,
    ) -> Result<Vec<Approval>, RepositoryError> {
        let mut pending: Vec<Approval> = self
            .approvals
            .iter()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .filter(|a| approver_id.is_none_or(|id| a.approver_id == Some(*id)))
            .map(|a| a.clone())
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(pending)
    }

    async fn list_approvals_for_run(&self, run_id: &Uuid) -> Result<Vec<Approval>, RepositoryError> {
        let mut approvals: Vec<Approval> = self
            .approvals
            .iter()
            .filter(|a| a.run_id == *run_id)
            .map(|a| a.clone())
            .collect();
        approvals.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(approvals)
    }
}

impl MemoryRepository for InMemoryStore {
    async fn load_memory(&self, run_id: &Uuid) -> Result<Option<MemoryContext>, RepositoryError> {
        Ok(self.memories.get(run_id).map(|m| m.clone()))
    }

    async fn save_memory(&self, run_id: &Uuid, context: &MemoryContext) -> Result<(), RepositoryError> {
        self.memories.insert(*run_id, context.clone());
        Ok(())
    }
}

impl UserRepository for InMemoryStore {
    async fn save_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_tenant_approver(&self, tenant_id: &Uuid) -> Result<Option<User>, RepositoryError> {
        let mut approvers: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.tenant_id == *tenant_id && u.can_approve())
            .map(|u| u.clone())
            .collect();
        approvers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(approvers.into_iter().next())
    }
}

impl KpiRepository for InMemoryStore {
    async fn record_kpis(&self, snapshot: &KpiSnapshot) -> Result<(), RepositoryError> {
        self.kpis
            .entry(snapshot.agent_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn list_kpis(&self, agent_id: &Uuid, limit: u32) -> Result<Vec<KpiSnapshot>, RepositoryError> {
        let mut snapshots = self
            .kpis
            .get(agent_id)
            .map(|s| s.clone())
            .unwrap_or_default();
        snapshots.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        snapshots.truncate(limit as usize);
        Ok(snapshots)
    }
}
