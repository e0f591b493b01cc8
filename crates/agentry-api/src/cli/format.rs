//! Shared table and text helpers for CLI output.

use agentry_types::approval::ApprovalStatus;
use agentry_types::run::RunStatus;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

pub fn run_status_text(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => format!("{}", style("○ pending").dim()),
        RunStatus::Running => format!("{}", style("◐ running").cyan()),
        RunStatus::WaitingApproval => format!("{}", style("◍ waiting approval").yellow()),
        RunStatus::Completed => format!("{}", style("● completed").green()),
        RunStatus::Failed => format!("{}", style("✗ failed").red()),
    }
}

pub fn approval_status_cell(status: ApprovalStatus) -> Cell {
    match status {
        ApprovalStatus::Pending => Cell::new("○ pending").fg(Color::Yellow),
        ApprovalStatus::Approved => Cell::new("● approved").fg(Color::Green),
        ApprovalStatus::Rejected => Cell::new("✗ rejected").fg(Color::Red),
    }
}

/// Cut `text` to `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn relative_time(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - *dt;

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{}d ago", diff.num_days())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}

pub fn format_duration_ms(ms: Option<u64>) -> String {
    match ms {
        None => "-".to_string(),
        Some(ms) if ms < 1_000 => format!("{ms}ms"),
        Some(ms) if ms < 60_000 => format!("{:.1}s", ms as f64 / 1_000.0),
        Some(ms) => format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000),
    }
}

pub fn format_percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}
