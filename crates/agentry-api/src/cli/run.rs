//! Run commands: run, status, resume, kpis.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;
use uuid::Uuid;

use agentry_types::approval::ApprovalStatus;
use agentry_types::run::{AgentRun, RunStatus};

use super::approval::print_approval;
use super::format::{
    approval_status_cell, format_duration_ms, format_percent, relative_time, run_status_text,
    table, truncate,
};
use crate::state::AppState;

/// Run an agent and print the result, or the approval it is waiting on.
///
/// ```bash
/// agentry run 0190... "Reset the VPN password for jdoe" --user 0190...
/// ```
pub async fn run_agent(
    state: &AppState,
    agent_id: Uuid,
    input: &str,
    user_id: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let run = state.service.run_agent(&agent_id, input, user_id).await?;
    print_run_with_pending(state, &run, json).await
}

pub async fn resume_run(
    state: &AppState,
    run_id: Uuid,
    approval_id: Uuid,
    json: bool,
) -> Result<()> {
    let run = state.service.resume_run(&run_id, &approval_id).await?;
    print_run_with_pending(state, &run, json).await
}

async fn print_run_with_pending(state: &AppState, run: &AgentRun, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
        return Ok(());
    }

    print_run(run);

    if run.status == RunStatus::WaitingApproval {
        let approvals = state.service.list_approvals_for_run(&run.id).await?;
        if let Some(pending) = approvals
            .iter()
            .find(|a| a.status == ApprovalStatus::Pending)
        {
            println!("  {}", style("── Waiting on ──").dim());
            print_approval(pending);
            println!(
                "  Approve with: {}",
                style(format!("agentry approve {} --approver <USER_ID>", pending.id)).yellow()
            );
            println!();
        }
    }
    Ok(())
}

/// Show a run, optionally with its tool calls and approvals.
pub async fn show_status(state: &AppState, run_id: Uuid, details: bool, json: bool) -> Result<()> {
    let run = state.service.get_run_status(&run_id).await?;

    if !details {
        if json {
            println!("{}", serde_json::to_string_pretty(&run)?);
        } else {
            print_run(&run);
        }
        return Ok(());
    }

    let tool_calls = state.service.list_tool_calls(&run_id).await?;
    let approvals = state.service.list_approvals_for_run(&run_id).await?;

    if json {
        let value = serde_json::json!({
            "run": run,
            "tool_calls": tool_calls,
            "approvals": approvals,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_run(&run);

    if !tool_calls.is_empty() {
        let mut calls = table(&["Call", "Tool", "Approved", "Result"]);
        for call in &tool_calls {
            let result = match (&call.error, &call.output) {
                (Some(err), _) => Cell::new(truncate(err, 60)).fg(Color::Red),
                (None, Some(output)) => Cell::new(truncate(&output.to_string(), 60)),
                (None, None) => Cell::new("-").fg(Color::DarkGrey),
            };
            calls.add_row(vec![
                Cell::new(&call.id).fg(Color::DarkGrey),
                Cell::new(&call.tool_name).fg(Color::Cyan),
                Cell::new(if call.approved { "yes" } else { "" }),
                result,
            ]);
        }
        println!("  {}", style("── Tool calls ──").dim());
        println!("{calls}");
        println!();
    }

    if !approvals.is_empty() {
        let now = chrono::Utc::now();
        let mut rows = table(&["Approval", "Action", "Status", "Requested"]);
        for approval in &approvals {
            rows.add_row(vec![
                Cell::new(approval.id).fg(Color::DarkGrey),
                Cell::new(&approval.action).fg(Color::Cyan),
                approval_status_cell(approval.status),
                Cell::new(relative_time(&approval.requested_at, now)),
            ]);
        }
        println!("  {}", style("── Approvals ──").dim());
        println!("{rows}");
        println!();
    }

    Ok(())
}

fn print_run(run: &AgentRun) {
    let metrics = &run.metrics;

    println!();
    println!("  {} {}", style("Run").bold(), style(run.id).cyan());
    println!("  {}     {}", style("Status:").bold(), run_status_text(run.status));
    println!("  {}      {}", style("Agent:").bold(), run.agent_id);
    println!("  {}      {}", style("Input:").bold(), truncate(&run.input, 80));
    println!(
        "  {}   {} iterations, {} tool calls, {} tokens, ${:.4}, {}",
        style("Metrics:").bold(),
        metrics.iterations,
        metrics.tool_calls_count,
        metrics.token_usage.total_tokens,
        metrics.cost_usd,
        format_duration_ms(metrics.duration_ms),
    );
    if let Some(output) = &run.output {
        println!();
        println!("  {}", style("── Output ──").dim());
        for line in output.lines() {
            println!("  {line}");
        }
    }
    if let Some(error) = &run.error {
        println!();
        println!("  {} {}", style("Error:").red().bold(), error);
    }
    println!();
}

/// Aggregated KPIs over the agent's recent runs.
pub async fn show_kpis(state: &AppState, agent_id: Uuid, json: bool) -> Result<()> {
    let summary = state.service.agent_kpis(&agent_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.total_runs == 0 {
        println!();
        println!("  {} No runs recorded for this agent yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut rows = table(&["KPI", "Value"]);
    rows.add_row(vec![
        Cell::new("Runs"),
        Cell::new(format!(
            "{} total, {} completed, {} failed",
            summary.total_runs, summary.completed_runs, summary.failed_runs
        )),
    ]);
    rows.add_row(vec![
        Cell::new("Success rate"),
        Cell::new(format_percent(summary.success_rate)),
    ]);
    rows.add_row(vec![
        Cell::new("First-contact resolution"),
        Cell::new(format_percent(summary.fcr_rate)),
    ]);
    rows.add_row(vec![
        Cell::new("Avg lead time"),
        Cell::new(format!("{:.2} min", summary.avg_lead_time_minutes)),
    ]);
    rows.add_row(vec![
        Cell::new("Avg cost"),
        Cell::new(format!("${:.4}", summary.avg_cost_usd)),
    ]);
    rows.add_row(vec![
        Cell::new("Tool efficiency"),
        Cell::new(match summary.tool_efficiency {
            Some(v) => format!("{v:.1} chars/call"),
            None => "-".to_string(),
        }),
    ]);

    println!();
    println!("{rows}");
    println!();
    Ok(())
}
