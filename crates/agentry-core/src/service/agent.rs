//! Agent service -- the operations exposed to transports.
//!
//! Wires the scheduler and the approval workflow together: a run that
//! suspends gets its approval opened before the caller sees it, and resuming
//! from an approval recorded elsewhere goes through the same path.
//!
//! Generic over `EngineStore` so agentry-core never depends on agentry-infra.

use std::sync::Arc;

use agentry_types::agent::AgentDefinition;
use agentry_types::approval::Approval;
use agentry_types::config::EngineConfig;
use agentry_types::error::RepositoryError;
use agentry_types::evaluation::KpiSummary;
use agentry_types::persona::PersonaUpdate;
use agentry_types::run::{AgentRun, ToolCallRecord};
use agentry_types::user::User;
use tracing::info;
use uuid::Uuid;

use crate::approval::{ApprovalError, ApprovalOutcome, ApprovalWorkflow};
use crate::engine::{EngineError, RunScheduler};
use crate::evaluation::aggregate_kpis;
use crate::event::EventBus;
use crate::llm::BoxLlmProvider;
use crate::notify::NotifierChain;
use crate::repository::EngineStore;
use crate::tool::BoxToolExecutor;

/// Runs considered when aggregating KPIs.
const KPI_WINDOW: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct AgentService<S: EngineStore> {
    store: Arc<S>,
    scheduler: Arc<RunScheduler<S>>,
    approvals: ApprovalWorkflow<S>,
}

impl<S: EngineStore> AgentService<S> {
    pub fn new(
        store: Arc<S>,
        llm: BoxLlmProvider,
        tools: BoxToolExecutor,
        notifier: NotifierChain,
        config: EngineConfig,
    ) -> Self {
        let scheduler = Arc::new(RunScheduler::new(Arc::clone(&store), llm, tools, config));
        let approvals = ApprovalWorkflow::new(Arc::clone(&scheduler), notifier);
        Self {
            store,
            scheduler,
            approvals,
        }
    }

    pub fn events(&self) -> &EventBus {
        self.scheduler.events()
    }

    // -----------------------------------------------------------------------
    // Agents and users
    // -----------------------------------------------------------------------

    /// Store an agent definition. Unknown role types are rejected up front.
    pub async fn register_agent(&self, agent: &AgentDefinition) -> Result<(), ServiceError> {
        let role = agent.role().map_err(EngineError::Configuration)?;
        self.store.save_agent(agent).await?;
        self.scheduler.invalidate_agent(&agent.id);
        info!(agent_id = %agent.id, name = %agent.name, role = %role, "agent registered");
        Ok(())
    }

    /// Merge a persona change into a stored agent. The next run of the agent
    /// renders the updated system prompt.
    pub async fn update_persona(
        &self,
        agent_id: &Uuid,
        update: PersonaUpdate,
    ) -> Result<AgentDefinition, ServiceError> {
        let mut agent = self.get_agent(agent_id).await?;
        agent.persona.apply(update.clone());
        self.store.save_agent(&agent).await?;
        self.scheduler.update_persona(agent_id, update);
        info!(agent_id = %agent_id, name = %agent.persona.name, "agent persona updated");
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: &Uuid) -> Result<AgentDefinition, ServiceError> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EngineError::AgentNotFound(*agent_id).into())
    }

    pub async fn list_agents(
        &self,
        tenant_id: Option<&Uuid>,
    ) -> Result<Vec<AgentDefinition>, ServiceError> {
        Ok(self.store.list_agents(tenant_id).await?)
    }

    pub async fn save_user(&self, user: &User) -> Result<(), ServiceError> {
        Ok(self.store.save_user(user).await?)
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Run an agent. A run that suspends comes back `waiting_approval` with
    /// its approval already opened.
    pub async fn run_agent(
        &self,
        agent_id: &Uuid,
        input: &str,
        user_id: Option<Uuid>,
    ) -> Result<AgentRun, ServiceError> {
        let run = self.scheduler.run(agent_id, input, user_id).await?;
        self.approvals.request_for_pending(&run, None).await?;
        Ok(run)
    }

    pub async fn get_run_status(&self, run_id: &Uuid) -> Result<AgentRun, ServiceError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(*run_id).into())
    }

    pub async fn list_tool_calls(&self, run_id: &Uuid) -> Result<Vec<ToolCallRecord>, ServiceError> {
        Ok(self.store.list_tool_calls(run_id).await?)
    }

    /// Resume a run from an approval that is already approved.
    ///
    /// Covers approvals resolved by a process that stopped before resuming.
    pub async fn resume_run(
        &self,
        run_id: &Uuid,
        approval_id: &Uuid,
    ) -> Result<AgentRun, ServiceError> {
        let outcome = self.approvals.resume_approved(run_id, approval_id).await?;
        Ok(outcome.run)
    }

    // -----------------------------------------------------------------------
    // Approvals
    // -----------------------------------------------------------------------

    pub async fn request_approval(
        &self,
        run_id: &Uuid,
        tool_call_id: &str,
        action: &str,
        context: serde_json::Value,
        approver_id: Option<Uuid>,
    ) -> Result<Approval, ServiceError> {
        Ok(self
            .approvals
            .request_approval(run_id, tool_call_id, action, context, None, approver_id)
            .await?)
    }

    pub async fn approve(
        &self,
        approval_id: &Uuid,
        approver_id: &Uuid,
    ) -> Result<ApprovalOutcome, ServiceError> {
        Ok(self.approvals.approve(approval_id, approver_id).await?)
    }

    pub async fn reject(
        &self,
        approval_id: &Uuid,
        approver_id: &Uuid,
        reason: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        Ok(self.approvals.reject(approval_id, approver_id, reason).await?)
    }

    pub async fn get_approval(&self, approval_id: &Uuid) -> Result<Approval, ServiceError> {
        Ok(self.approvals.get_approval(approval_id).await?)
    }

    pub async fn list_pending_approvals(
        &self,
        approver_id: Option<&Uuid>,
    ) -> Result<Vec<Approval>, ServiceError> {
        Ok(self.approvals.list_pending(approver_id).await?)
    }

    pub async fn list_approvals_for_run(&self, run_id: &Uuid) -> Result<Vec<Approval>, ServiceError> {
        Ok(self.store.list_approvals_for_run(run_id).await?)
    }

    // -----------------------------------------------------------------------
    // KPIs
    // -----------------------------------------------------------------------

    pub async fn agent_kpis(&self, agent_id: &Uuid) -> Result<KpiSummary, ServiceError> {
        let runs = self.store.list_runs_by_agent(agent_id, KPI_WINDOW).await?;
        Ok(aggregate_kpis(&runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_types::memory::MemoryConfig;
    use agentry_types::policy::{Guardrail, GuardrailAction, GuardrailTrigger};
    use agentry_types::run::RunStatus;

    use crate::engine::scheduler::testing::{RecordingTools, ScriptedLlm, reply, tool_request};
    use crate::repository::{ApprovalRepository, InMemoryStore};

    fn service(llm: &ScriptedLlm, tools: &RecordingTools) -> AgentService<InMemoryStore> {
        AgentService::new(
            Arc::new(InMemoryStore::new()),
            BoxLlmProvider::new(llm.clone()),
            BoxToolExecutor::new(tools.clone()),
            NotifierChain::disabled(),
            EngineConfig::default(),
        )
    }

    fn admin(tenant_id: Uuid) -> User {
        User {
            id: Uuid::now_v7(),
            tenant_id,
            name: "Olga Owner".to_string(),
            email: Some("olga@example.com".to_string()),
            roles: vec!["owner".to_string()],
        }
    }

    fn support_agent() -> AgentDefinition {
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "it-support");
        agent.policies.guardrails.push(Guardrail {
            id: "no-deletes".to_string(),
            name: "account deletion".to_string(),
            trigger: GuardrailTrigger::ToolName {
                name: "delete_account".to_string(),
            },
            action: GuardrailAction::RequireApproval,
            message: None,
        });
        agent
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_role() {
        let (llm, tools) = (ScriptedLlm::default(), RecordingTools::default());
        let svc = service(&llm, &tools);
        let agent = AgentDefinition::new(Uuid::now_v7(), "Pilot", "astronaut");
        let err = svc.register_agent(&agent).await.unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_delete_account_waits_then_reject_fails_run() {
        let llm = ScriptedLlm::new(vec![tool_request(
            "call_del",
            "delete_account",
            serde_json::json!({"account": 42}),
        )]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let agent = support_agent();
        svc.register_agent(&agent).await.unwrap();
        let owner = admin(agent.tenant_id);
        svc.save_user(&owner).await.unwrap();

        let run = svc.run_agent(&agent.id, "Please delete account 42", None).await.unwrap();
        assert_eq!(run.status, RunStatus::WaitingApproval);
        assert_eq!(
            svc.get_run_status(&run.id).await.unwrap().status,
            RunStatus::WaitingApproval
        );

        let pending = svc.list_pending_approvals(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tool_call_id, "call_del");
        assert_eq!(pending[0].approver_id, Some(owner.id));

        let outcome = svc
            .reject(&pending[0].id, &owner.id, Some("not authorized".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert!(outcome.run.output.unwrap().contains("not authorized"));
        assert!(tools.names().is_empty());
        assert!(svc.list_pending_approvals(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_twice_resumes_once() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_del", "delete_account", serde_json::json!({"account": 42})),
            reply("Account 42 has been deleted."),
        ]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let agent = support_agent();
        svc.register_agent(&agent).await.unwrap();
        let owner = admin(agent.tenant_id);
        svc.save_user(&owner).await.unwrap();

        let run = svc.run_agent(&agent.id, "Please delete account 42", None).await.unwrap();
        let approval = svc.list_approvals_for_run(&run.id).await.unwrap().remove(0);

        let outcome = svc.approve(&approval.id, &owner.id).await.unwrap();
        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(outcome.run.output.as_deref(), Some("Account 42 has been deleted."));

        let err = svc.approve(&approval.id, &owner.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Approval(ApprovalError::AlreadyResolved(_))
        ));
        assert_eq!(tools.names(), vec!["delete_account"]);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_run_requires_approved_approval() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_del", "delete_account", serde_json::json!({})),
            reply("Done."),
        ]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let agent = support_agent();
        svc.register_agent(&agent).await.unwrap();

        let run = svc.run_agent(&agent.id, "delete account 9", None).await.unwrap();
        let approval = svc.list_approvals_for_run(&run.id).await.unwrap().remove(0);
        assert!(approval.approver_id.is_none());

        let err = svc.resume_run(&run.id, &approval.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Approval(ApprovalError::Engine(EngineError::InvalidState(_)))
        ));

        // Approval recorded by another process that stopped before resuming.
        svc.store
            .resolve_approval(
                &approval.id,
                &agentry_types::approval::ApprovalDecision::Approve,
                &Uuid::now_v7(),
            )
            .await
            .unwrap();
        let resumed = svc.resume_run(&run.id, &approval.id).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(tools.names(), vec!["delete_account"]);

        let err = svc.resume_run(&run.id, &approval.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Approval(ApprovalError::Engine(EngineError::InvalidState(_)))
        ));
        assert_eq!(tools.names(), vec!["delete_account"]);
    }

    #[tokio::test]
    async fn test_update_persona_applies_to_next_run() {
        let llm = ScriptedLlm::new(vec![reply("Hi."), reply("Good day.")]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "custom");
        svc.register_agent(&agent).await.unwrap();
        svc.run_agent(&agent.id, "hello", None).await.unwrap();
        assert!(!llm.request(0).messages[0].content.contains("Bertram"));

        let updated = svc
            .update_persona(
                &agent.id,
                PersonaUpdate {
                    name: Some("Bertram".to_string()),
                    tone: Some("formal".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.persona.name, "Bertram");
        assert_eq!(svc.get_agent(&agent.id).await.unwrap().persona.tone, "formal");

        svc.run_agent(&agent.id, "hello again", None).await.unwrap();
        let prompt = &llm.request(1).messages[0].content;
        assert!(prompt.contains("You are Bertram, a formal, courteous assistant."));
    }

    #[tokio::test]
    async fn test_update_persona_unknown_agent() {
        let (llm, tools) = (ScriptedLlm::default(), RecordingTools::default());
        let svc = service(&llm, &tools);
        let err = svc
            .update_persona(&Uuid::now_v7(), PersonaUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn test_facts_do_not_leak_between_runs() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "vpn_status", serde_json::json!({})),
            reply("Your VPN profile was reset."),
            reply("The VPN is up."),
        ]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "custom");
        agent.memory = MemoryConfig {
            compression_threshold: 5,
            keep_recent: 1,
            ..MemoryConfig::default()
        };
        svc.register_agent(&agent).await.unwrap();

        let first = svc
            .run_agent(&agent.id, "I am Jane Doe from accounting, reset my VPN", None)
            .await
            .unwrap();
        assert_eq!(first.status, RunStatus::Completed);
        assert!(llm.request(1).messages[0].content.contains("Jane Doe"));

        let second = svc.run_agent(&agent.id, "Is the VPN up?", None).await.unwrap();
        assert_eq!(second.status, RunStatus::Completed);
        assert!(!llm.request(2).messages[0].content.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn test_agent_kpis_aggregate_runs() {
        let llm = ScriptedLlm::new(vec![reply("Printer driver reinstalled.")]);
        let tools = RecordingTools::default();
        let svc = service(&llm, &tools);
        let agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "custom");
        svc.register_agent(&agent).await.unwrap();

        svc.run_agent(&agent.id, "printer broken", None).await.unwrap();
        svc.run_agent(&agent.id, "mail me at a@b.com", None).await.unwrap();

        let summary = svc.agent_kpis(&agent.id).await.unwrap();
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.completed_runs, 1);
        assert_eq!(summary.failed_runs, 1);
        assert_eq!(summary.success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_unknown_run_status() {
        let (llm, tools) = (ScriptedLlm::default(), RecordingTools::default());
        let svc = service(&llm, &tools);
        let err = svc.get_run_status(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::RunNotFound(_))));
    }
}
