//! ApprovalWorkflow -- opens, resolves and acts on approvals.
//!
//! Resolution is serialized per run by an async mutex and made atomic by a
//! status compare-and-swap in the store, so concurrent approve/reject calls
//! produce exactly one terminal transition and at most one resume.

use std::sync::Arc;

use agentry_types::approval::{Approval, ApprovalDecision};
use agentry_types::error::RepositoryError;
use agentry_types::event::RunEvent;
use agentry_types::approval::ApprovalStatus;
use agentry_types::run::{AgentRun, PendingApproval, RunStatus};
use agentry_types::user::User;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{EngineError, RunScheduler};
use crate::notify::{ApprovalNotice, NotifierChain};
use crate::repository::EngineStore;

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval not found: {0}")]
    NotFound(Uuid),

    #[error("approval {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error("user {0} is not allowed to resolve approvals")]
    NotAuthorized(Uuid),

    #[error("approval {approval_id} was recorded but run {run_id} could not be resumed: {source}")]
    ResumeFailed {
        approval_id: Uuid,
        run_id: Uuid,
        source: EngineError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of resolving an approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub approval: Approval,
    /// The run after the decision was applied.
    pub run: AgentRun,
    /// Opened when the resumed run suspended again on another call.
    pub next_approval: Option<Approval>,
}

pub struct ApprovalWorkflow<S: EngineStore> {
    scheduler: Arc<RunScheduler<S>>,
    store: Arc<S>,
    notifier: NotifierChain,
    run_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: EngineStore> ApprovalWorkflow<S> {
    pub fn new(scheduler: Arc<RunScheduler<S>>, notifier: NotifierChain) -> Self {
        Self {
            store: Arc::clone(scheduler.store()),
            scheduler,
            notifier,
            run_locks: DashMap::new(),
        }
    }

    /// Persist a pending approval, mark the run as waiting and notify an approver.
    ///
    /// The approver is `approver_id` when given, else the first admin or
    /// owner of the run's tenant. Notification failures are only logged.
    #[tracing::instrument(skip(self, action, context), fields(run_id = %run_id, tool_call_id = %tool_call_id))]
    pub async fn request_approval(
        &self,
        run_id: &Uuid,
        tool_call_id: &str,
        action: &str,
        context: serde_json::Value,
        requested_by: Option<Uuid>,
        approver_id: Option<Uuid>,
    ) -> Result<Approval, ApprovalError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(*run_id))?;
        if run.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is already {}",
                run.status
            ))
            .into());
        }

        let tenant_id = run.tenant_id;
        let approver = self.resolve_approver(&run, approver_id).await?;
        let approval = Approval::pending(
            *run_id,
            tool_call_id,
            action,
            context,
            requested_by,
            approver.as_ref().map(|u| u.id).or(approver_id),
        );
        self.store.create_approval(&approval).await?;

        if run.status != RunStatus::WaitingApproval {
            self.mark_waiting(run, &approval).await?;
        }

        info!(
            target: "agentry::audit",
            approval_id = %approval.id,
            run_id = %run_id,
            action = %approval.action,
            approver_id = ?approval.approver_id,
            "approval requested"
        );

        match approver {
            Some(user) => self.notify(&user, &approval).await,
            None => warn!(
                approval_id = %approval.id,
                tenant_id = %tenant_id,
                "no approver found, approval will wait for a manual decision"
            ),
        }

        Ok(approval)
    }

    /// Open an approval for the call `run` is suspended on, if any.
    pub async fn request_for_pending(
        &self,
        run: &AgentRun,
        approver_id: Option<Uuid>,
    ) -> Result<Option<Approval>, ApprovalError> {
        if run.status != RunStatus::WaitingApproval {
            return Ok(None);
        }
        let Some(pending) = run.pending_approval() else {
            return Ok(None);
        };

        let context = serde_json::json!({
            "tool_name": pending.tool_name,
            "input": pending.input,
            "reason": pending.reason,
            "rule_id": pending.rule_id,
            "agent_id": run.agent_id,
        });
        let approval = self
            .request_approval(
                &run.id,
                &pending.tool_call_id,
                &pending.tool_name,
                context,
                run.user_id,
                approver_id,
            )
            .await?;
        Ok(Some(approval))
    }

    /// Approve and resume the run.
    #[tracing::instrument(skip(self), fields(approval_id = %approval_id, approver_id = %approver_id))]
    pub async fn approve(
        &self,
        approval_id: &Uuid,
        approver_id: &Uuid,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let run_id = self.precheck(approval_id, approver_id).await?;
        let lock = self.run_lock(&run_id);
        let _guard = lock.lock().await;

        let approval = self
            .store
            .resolve_approval(approval_id, &ApprovalDecision::Approve, approver_id)
            .await?
            .ok_or(ApprovalError::AlreadyResolved(*approval_id))?;
        self.announce(&approval, true);

        let run = match self.scheduler.resume(&run_id, &approval).await {
            Ok(run) => run,
            Err(source) => {
                warn!(
                    target: "agentry::audit",
                    approval_id = %approval.id,
                    run_id = %run_id,
                    error = %source,
                    "approval recorded but run not resumed"
                );
                return Err(ApprovalError::ResumeFailed {
                    approval_id: approval.id,
                    run_id,
                    source,
                });
            }
        };
        let next_approval = self.request_for_pending(&run, approval.approver_id).await?;
        self.release_if_done(&run);

        Ok(ApprovalOutcome {
            approval,
            run,
            next_approval,
        })
    }

    /// Resume `run_id` with an approval that was already approved, e.g. after
    /// a failed resume. The approval must cover the call the run waits on and
    /// must not have been applied before.
    #[tracing::instrument(skip(self), fields(run_id = %run_id, approval_id = %approval_id))]
    pub async fn resume_approved(
        &self,
        run_id: &Uuid,
        approval_id: &Uuid,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().await;

        let approval = self.get_approval(approval_id).await?;
        if approval.status != ApprovalStatus::Approved {
            return Err(EngineError::InvalidState(format!(
                "approval {approval_id} is {}",
                approval.status
            ))
            .into());
        }

        let run = self.scheduler.resume(run_id, &approval).await?;
        let next_approval = self.request_for_pending(&run, approval.approver_id).await?;
        self.release_if_done(&run);

        Ok(ApprovalOutcome {
            approval,
            run,
            next_approval,
        })
    }

    /// Reject and fail the run. The run is never resumed.
    #[tracing::instrument(skip(self, reason), fields(approval_id = %approval_id, approver_id = %approver_id))]
    pub async fn reject(
        &self,
        approval_id: &Uuid,
        approver_id: &Uuid,
        reason: Option<String>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let run_id = self.precheck(approval_id, approver_id).await?;
        let lock = self.run_lock(&run_id);
        let _guard = lock.lock().await;

        let decision = ApprovalDecision::Reject {
            reason: reason.clone(),
        };
        let approval = self
            .store
            .resolve_approval(approval_id, &decision, approver_id)
            .await?
            .ok_or(ApprovalError::AlreadyResolved(*approval_id))?;
        self.announce(&approval, false);

        let message = match reason.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => format!("Rejected: {r}"),
            _ => "Rejected by approver".to_string(),
        };
        let run = self
            .scheduler
            .fail_run(&run_id, message.clone(), message)
            .await?;
        self.release_if_done(&run);

        Ok(ApprovalOutcome {
            approval,
            run,
            next_approval: None,
        })
    }

    pub async fn get_approval(&self, approval_id: &Uuid) -> Result<Approval, ApprovalError> {
        self.store
            .get_approval(approval_id)
            .await?
            .ok_or(ApprovalError::NotFound(*approval_id))
    }

    /// Pending approvals, oldest first, optionally for one approver only.
    pub async fn list_pending(
        &self,
        approver_id: Option<&Uuid>,
    ) -> Result<Vec<Approval>, ApprovalError> {
        Ok(self.store.list_pending_approvals(approver_id).await?)
    }

    /// Returns the run id of a still-pending approval the user may resolve.
    async fn precheck(&self, approval_id: &Uuid, approver_id: &Uuid) -> Result<Uuid, ApprovalError> {
        let approval = self.get_approval(approval_id).await?;
        if approval.status.is_terminal() {
            return Err(ApprovalError::AlreadyResolved(*approval_id));
        }
        // Unknown ids are accepted as external identities; known users need the role.
        let refused = self
            .store
            .get_user(approver_id)
            .await?
            .is_some_and(|user| !user.can_approve() && approval.approver_id != Some(user.id));
        if refused {
            warn!(
                target: "agentry::audit",
                approval_id = %approval_id,
                user_id = %approver_id,
                "approval resolution refused"
            );
            return Err(ApprovalError::NotAuthorized(*approver_id));
        }
        Ok(approval.run_id)
    }

    async fn resolve_approver(
        &self,
        run: &AgentRun,
        approver_id: Option<Uuid>,
    ) -> Result<Option<User>, ApprovalError> {
        let user = match approver_id {
            Some(id) => self.store.get_user(&id).await?,
            None => self.store.find_tenant_approver(&run.tenant_id).await?,
        };
        Ok(user)
    }

    /// Hold a running run on a manually requested approval.
    async fn mark_waiting(&self, mut run: AgentRun, approval: &Approval) -> Result<(), ApprovalError> {
        if let Some(mut state) = self.store.load_state(&run.id).await? {
            let pending = PendingApproval {
                tool_call_id: approval.tool_call_id.clone(),
                tool_name: approval.action.clone(),
                input: approval
                    .context
                    .get("input")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
                reason: None,
                rule_id: None,
            };
            state.set_pending_approval(Some(&pending));
            state.status = RunStatus::WaitingApproval;
            self.store.save_state(&state).await?;
            run.metadata = state.metadata.clone();
        }
        run.status = RunStatus::WaitingApproval;
        self.store.update_run(&run).await?;
        Ok(())
    }

    async fn notify(&self, recipient: &User, approval: &Approval) {
        let notice = ApprovalNotice {
            approval_id: approval.id,
            run_id: approval.run_id,
            tool_call_id: approval.tool_call_id.clone(),
            action: approval.action.clone(),
            context: approval.context.clone(),
        };
        match self.notifier.deliver(recipient, &notice).await {
            Ok(channel) => info!(
                approval_id = %approval.id,
                recipient = %recipient.id,
                channel = %channel,
                "approver notified"
            ),
            Err(e) => warn!(
                approval_id = %approval.id,
                recipient = %recipient.id,
                error = %e,
                "approver could not be notified"
            ),
        }
    }

    fn announce(&self, approval: &Approval, approved: bool) {
        info!(
            target: "agentry::audit",
            approval_id = %approval.id,
            run_id = %approval.run_id,
            resolved_by = ?approval.resolved_by,
            status = %approval.status,
            "approval resolved"
        );
        self.scheduler.events().publish(RunEvent::ApprovalResolved {
            run_id: approval.run_id,
            approval_id: approval.id,
            approved,
        });
    }

    fn run_lock(&self, run_id: &Uuid) -> Arc<Mutex<()>> {
        Arc::clone(
            self.run_locks
                .entry(*run_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn release_if_done(&self, run: &AgentRun) {
        if run.status.is_terminal() {
            self.run_locks.remove(&run.id);
        }
    }
}
