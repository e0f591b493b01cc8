//! Approval commands: list, request, approve, reject.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;
use uuid::Uuid;

use agentry_core::approval::ApprovalOutcome;
use agentry_types::approval::Approval;

use super::format::{approval_status_cell, relative_time, run_status_text, table, truncate};
use crate::state::AppState;

pub async fn list_pending(state: &AppState, approver: Option<Uuid>, json: bool) -> Result<()> {
    let approvals = state
        .service
        .list_pending_approvals(approver.as_ref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&approvals)?);
        return Ok(());
    }

    if approvals.is_empty() {
        println!();
        println!("  {} No pending approvals.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let now = chrono::Utc::now();
    let mut rows = table(&["Approval", "Run", "Action", "Approver", "Requested"]);
    for approval in &approvals {
        rows.add_row(vec![
            Cell::new(approval.id).fg(Color::Cyan),
            Cell::new(approval.run_id).fg(Color::DarkGrey),
            Cell::new(&approval.action),
            Cell::new(
                approval
                    .approver_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "any admin".to_string()),
            ),
            Cell::new(relative_time(&approval.requested_at, now)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{rows}");
    println!();
    println!(
        "  {} pending approval{}",
        style(approvals.len()).bold(),
        if approvals.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

/// Open an approval by hand, e.g. for a call flagged outside the policy rules.
pub async fn request_approval(
    state: &AppState,
    run_id: Uuid,
    tool_call_id: &str,
    action: &str,
    context: Option<&str>,
    approver: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let context = parse_context(context)?;
    let approval = state
        .service
        .request_approval(&run_id, tool_call_id, action, context, approver)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&approval)?);
        return Ok(());
    }

    println!();
    println!("  {} Approval requested", style("✓").green().bold());
    print_approval(&approval);
    Ok(())
}

pub async fn approve(state: &AppState, approval_id: Uuid, approver: Uuid, json: bool) -> Result<()> {
    let outcome = state.service.approve(&approval_id, &approver).await?;
    print_outcome(&outcome, json)
}

pub async fn reject(
    state: &AppState,
    approval_id: Uuid,
    approver: Uuid,
    reason: Option<String>,
    json: bool,
) -> Result<()> {
    let outcome = state.service.reject(&approval_id, &approver, reason).await?;
    print_outcome(&outcome, json)
}

fn print_outcome(outcome: &ApprovalOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "approval": outcome.approval,
            "run": outcome.run,
            "next_approval": outcome.next_approval,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let approval = &outcome.approval;
    println!();
    println!(
        "  {} Approval {} is {}",
        style("✓").green().bold(),
        style(approval.id).cyan(),
        style(approval.status).bold()
    );
    if let Some(reason) = &approval.rejection_reason {
        println!("  {}     {}", style("Reason:").bold(), reason);
    }
    println!(
        "  {}        {} {}",
        style("Run:").bold(),
        outcome.run.id,
        run_status_text(outcome.run.status)
    );
    if let Some(output) = &outcome.run.output {
        println!("  {}     {}", style("Output:").bold(), truncate(output, 120));
    }
    if let Some(error) = &outcome.run.error {
        println!("  {}      {}", style("Error:").red().bold(), error);
    }
    println!();

    if let Some(next) = &outcome.next_approval {
        println!("  {}", style("── Run is waiting again ──").dim());
        print_approval(next);
    }
    Ok(())
}

pub(crate) fn print_approval(approval: &Approval) {
    let mut rows = table(&["Field", "Value"]);
    rows.add_row(vec![Cell::new("Approval"), Cell::new(approval.id).fg(Color::Cyan)]);
    rows.add_row(vec![Cell::new("Action"), Cell::new(&approval.action)]);
    rows.add_row(vec![Cell::new("Tool call"), Cell::new(&approval.tool_call_id)]);
    rows.add_row(vec![Cell::new("Status"), approval_status_cell(approval.status)]);
    if let Some(approver) = approval.approver_id {
        rows.add_row(vec![Cell::new("Approver"), Cell::new(approver)]);
    }
    if !approval.context.is_null() {
        rows.add_row(vec![
            Cell::new("Context"),
            Cell::new(truncate(&approval.context.to_string(), 200)),
        ]);
    }
    println!("{rows}");
    println!();
}

fn parse_context(raw: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--context must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--context must be a JSON object");
    }
    Ok(value)
}
