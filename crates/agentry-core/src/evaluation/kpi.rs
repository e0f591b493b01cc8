//! KPI aggregation over an agent's runs.

use agentry_types::evaluation::{KpiKind, KpiSummary};
use agentry_types::run::{AgentRun, RunStatus};

/// Aggregate KPIs over `runs`.
///
/// Rates are over all runs; averages are over completed runs only.
/// A run without a recorded FCR value counts as resolved.
pub fn aggregate_kpis(runs: &[AgentRun]) -> KpiSummary {
    let total = runs.len();
    if total == 0 {
        return KpiSummary::default();
    }

    let completed: Vec<&AgentRun> = runs
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .collect();
    let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();

    let resolved = runs
        .iter()
        .filter(|r| {
            r.metrics
                .kpi
                .get(KpiKind::Fcr.as_str())
                .is_none_or(|v| *v > 0.0)
        })
        .count();

    let (avg_lead_time_minutes, avg_cost_usd) = if completed.is_empty() {
        (0.0, 0.0)
    } else {
        let n = completed.len() as f64;
        let lead: f64 = completed
            .iter()
            .map(|r| r.metrics.duration_ms.unwrap_or(0) as f64 / 1000.0 / 60.0)
            .sum();
        let cost: f64 = completed.iter().map(|r| r.metrics.cost_usd).sum();
        (lead / n, cost / n)
    };

    let efficiencies: Vec<f64> = completed
        .iter()
        .filter(|r| r.metrics.tool_calls_count > 0)
        .map(|r| {
            let len = r.output.as_deref().map(|o| o.chars().count()).unwrap_or(0);
            len as f64 / r.metrics.tool_calls_count as f64
        })
        .collect();
    let tool_efficiency = if efficiencies.is_empty() {
        None
    } else {
        Some(efficiencies.iter().sum::<f64>() / efficiencies.len() as f64)
    };

    KpiSummary {
        total_runs: total as u64,
        completed_runs: completed.len() as u64,
        failed_runs: failed as u64,
        success_rate: completed.len() as f64 / total as f64,
        fcr_rate: resolved as f64 / total as f64,
        avg_lead_time_minutes,
        avg_cost_usd,
        tool_efficiency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_types::memory::MemoryContext;
    use agentry_types::run::AgentState;
    use chrono::Utc;
    use uuid::Uuid;

    fn run(status: RunStatus, duration_ms: u64, cost: f64, tools: u32, output: &str) -> AgentRun {
        let mut state = AgentState::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            None,
            "q",
            MemoryContext::new(4000),
        );
        state.status = status;
        state.output = Some(output.to_string());
        state.metrics.duration_ms = Some(duration_ms);
        state.metrics.cost_usd = cost;
        state.metrics.tool_calls_count = tools;
        state.to_run(Utc::now())
    }

    #[test]
    fn test_empty_runs_yield_zero_summary() {
        assert_eq!(aggregate_kpis(&[]), KpiSummary::default());
    }

    #[test]
    fn test_aggregate_mixed_runs() {
        let mut escalated = run(RunStatus::Completed, 60_000, 0.2, 2, "abcd");
        escalated.metrics.kpi.insert("fcr".to_string(), 0.0);
        let runs = vec![
            run(RunStatus::Completed, 180_000, 0.4, 0, "done"),
            escalated,
            run(RunStatus::Failed, 0, 0.1, 0, ""),
            run(RunStatus::WaitingApproval, 0, 0.0, 0, ""),
        ];

        let summary = aggregate_kpis(&runs);
        assert_eq!(summary.total_runs, 4);
        assert_eq!(summary.completed_runs, 2);
        assert_eq!(summary.failed_runs, 1);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.fcr_rate, 0.75);
        assert!((summary.avg_lead_time_minutes - 2.0).abs() < 1e-9);
        assert!((summary.avg_cost_usd - 0.3).abs() < 1e-9);
        assert_eq!(summary.tool_efficiency, Some(2.0));
    }
}
