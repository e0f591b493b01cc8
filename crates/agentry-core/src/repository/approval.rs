//! Approval repository trait.

use agentry_types::approval::{Approval, ApprovalDecision};
use agentry_types::error::RepositoryError;
use uuid::Uuid;

pub trait ApprovalRepository: Send + Sync {
    fn create_approval(
        &self,
        approval: &Approval,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_approval(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Approval>, RepositoryError>> + Send;

    /// Atomically move a pending approval to its terminal status.
    ///
    /// Returns the updated approval, or `None` when the approval does not
    /// exist or is no longer pending. Exactly one concurrent caller wins.
    fn resolve_approval(
        &self,
        id: &Uuid,
        decision: &ApprovalDecision,
        resolved_by: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Approval>, RepositoryError>> + Send;

    /// Pending approvals, oldest first, optionally only those addressed to one approver.
    fn list_pending_approvals(
        &self,
        approver_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<Vec<Approval>, RepositoryError>> + Send;

    fn list_approvals_for_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Approval>, RepositoryError>> + Send;
}
