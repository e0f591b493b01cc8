//! SQLite approval repository.
//!
//! Resolution is a single conditional `UPDATE ... RETURNING`, so across any
//! number of processes exactly one resolver sees the row come back.

use agentry_core::repository::ApprovalRepository;
use agentry_types::approval::{Approval, ApprovalDecision, ApprovalStatus};
use agentry_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::store::{
    SqliteStore, format_datetime, from_json, parse_datetime, parse_opt_uuid, parse_uuid,
    query_err, to_json,
};

struct ApprovalRow {
    id: String,
    run_id: String,
    tool_call_id: String,
    action: String,
    context: String,
    status: String,
    requested_by: Option<String>,
    approver_id: Option<String>,
    resolved_by: Option<String>,
    requested_at: String,
    resolved_at: Option<String>,
    rejection_reason: Option<String>,
}

impl ApprovalRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            tool_call_id: row.try_get("tool_call_id")?,
            action: row.try_get("action")?,
            context: row.try_get("context")?,
            status: row.try_get("status")?,
            requested_by: row.try_get("requested_by")?,
            approver_id: row.try_get("approver_id")?,
            resolved_by: row.try_get("resolved_by")?,
            requested_at: row.try_get("requested_at")?,
            resolved_at: row.try_get("resolved_at")?,
            rejection_reason: row.try_get("rejection_reason")?,
        })
    }

    fn into_approval(self) -> Result<Approval, RepositoryError> {
        let status: ApprovalStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(Approval {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            tool_call_id: self.tool_call_id,
            action: self.action,
            context: from_json(&self.context, "approval context")?,
            status,
            requested_by: parse_opt_uuid(self.requested_by.as_deref())?,
            approver_id: parse_opt_uuid(self.approver_id.as_deref())?,
            resolved_by: parse_opt_uuid(self.resolved_by.as_deref())?,
            requested_at: parse_datetime(&self.requested_at)?,
            resolved_at: self
                .resolved_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            rejection_reason: self.rejection_reason,
        })
    }
}

fn approval_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Approval, RepositoryError> {
    ApprovalRow::from_row(row).map_err(query_err)?.into_approval()
}

impl ApprovalRepository for SqliteStore {
    async fn create_approval(&self, approval: &Approval) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO approvals
               (id, run_id, tool_call_id, action, context, status, requested_by,
                approver_id, resolved_by, requested_at, resolved_at, rejection_reason)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(approval.id.to_string())
        .bind(approval.run_id.to_string())
        .bind(&approval.tool_call_id)
        .bind(&approval.action)
        .bind(to_json(&approval.context, "approval context")?)
        .bind(approval.status.as_str())
        .bind(approval.requested_by.map(|u| u.to_string()))
        .bind(approval.approver_id.map(|u| u.to_string()))
        .bind(approval.resolved_by.map(|u| u.to_string()))
        .bind(format_datetime(&approval.requested_at))
        .bind(approval.resolved_at.as_ref().map(format_datetime))
        .bind(&approval.rejection_reason)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_approval(&self, id: &Uuid) -> Result<Option<Approval>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM approvals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(approval_from_row).transpose()
    }

    async fn resolve_approval(
        &self,
        id: &Uuid,
        decision: &ApprovalDecision,
        resolved_by: &Uuid,
    ) -> Result<Option<Approval>, RepositoryError> {
        let reason = match decision {
            ApprovalDecision::Reject { reason } => reason.clone(),
            ApprovalDecision::Approve => None,
        };

        let row = sqlx::query(
            r#"UPDATE approvals SET
                 status = ?, resolved_by = ?, resolved_at = ?, rejection_reason = ?
               WHERE id = ? AND status = 'pending'
               RETURNING *"#,
        )
        .bind(decision.status().as_str())
        .bind(resolved_by.to_string())
        .bind(format_datetime(&Utc::now()))
        .bind(&reason)
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?;

        row.as_ref().map(approval_from_row).transpose()
    }

    async fn list_pending_approvals(
        &self,
        approver_id: Option<&Uuid>,
    ) -> Result<Vec<Approval>, RepositoryError> {
        let rows = match approver_id {
            Some(approver) => {
                sqlx::query(
                    "SELECT * FROM approvals WHERE status = 'pending' AND approver_id = ? ORDER BY requested_at ASC",
                )
                .bind(approver.to_string())
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM approvals WHERE status = 'pending' ORDER BY requested_at ASC",
                )
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_err)?;

        rows.iter().map(approval_from_row).collect()
    }

    async fn list_approvals_for_run(&self, run_id: &Uuid) -> Result<Vec<Approval>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM approvals WHERE run_id = ? ORDER BY requested_at ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(approval_from_row).collect()
    }
}
