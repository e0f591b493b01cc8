//! Evaluation hooks run around each agent run.
//!
//! All results are advisory. The scheduler records them but never retries
//! on its own.

use std::collections::BTreeMap;

use agentry_types::evaluation::{EvaluationResult, KpiKind, KpiSnapshot};
use agentry_types::run::{AgentState, RunStatus};
use chrono::Utc;

/// Tool name that marks a run as escalated for the FCR KPI.
pub const ESCALATE_TOOL: &str = "escalate";

/// Retries at or above this count always escalate.
const ESCALATE_AFTER_RETRIES: u32 = 3;

const RETRYABLE: &[&str] = &[
    "timeout",
    "rate_limit",
    "rate limit",
    "network",
    "temporary",
];

const CRITICAL: &[&str] = &[
    "security",
    "compliance",
    "data_loss",
    "data loss",
    "unauthorized",
];

pub struct EvaluationHooks {
    kpis: Vec<KpiKind>,
}

impl EvaluationHooks {
    pub fn new(kpis: Vec<KpiKind>) -> Self {
        Self { kpis }
    }

    pub fn pre_execution(&self, state: &AgentState) -> EvaluationResult {
        if state.input.trim().is_empty() {
            return EvaluationResult::fail("Input is empty");
        }
        if !matches!(state.status, RunStatus::Pending | RunStatus::Running) {
            return EvaluationResult::fail(format!(
                "Agent is in invalid state: {}",
                state.status
            ));
        }
        EvaluationResult::pass()
    }

    pub fn post_execution(&self, state: &AgentState) -> EvaluationResult {
        let output_empty = state
            .output
            .as_deref()
            .is_none_or(|o| o.trim().is_empty());
        if output_empty {
            return EvaluationResult {
                should_retry: true,
                ..EvaluationResult::fail("Output is empty")
            };
        }

        let metrics = &state.metrics;
        let mut result = EvaluationResult::pass();
        result.metrics = BTreeMap::from([
            (
                "duration_ms".to_string(),
                metrics.duration_ms.unwrap_or(0) as f64,
            ),
            (
                "total_tokens".to_string(),
                metrics.token_usage.total_tokens as f64,
            ),
            ("cost_usd".to_string(), metrics.cost_usd),
            (
                "tool_calls_count".to_string(),
                metrics.tool_calls_count as f64,
            ),
        ]);
        result
    }

    /// Classify a failure as retryable and/or needing escalation.
    pub fn on_error(&self, state: &AgentState) -> EvaluationResult {
        let error = state
            .error
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        let lower = error.to_lowercase();

        let should_retry = RETRYABLE.iter().any(|k| lower.contains(k));
        let should_escalate = state.metrics.retry_count >= ESCALATE_AFTER_RETRIES
            || CRITICAL.iter().any(|k| lower.contains(k));

        EvaluationResult {
            should_retry,
            should_escalate,
            ..EvaluationResult::fail(error)
        }
    }

    /// Compute the enabled KPIs into `state.metrics.kpi`.
    pub fn track_kpi(&self, state: &mut AgentState) -> KpiSnapshot {
        let mut values = BTreeMap::new();
        for kind in &self.kpis {
            if let Some(value) = calculate_kpi(*kind, state) {
                values.insert(kind.as_str().to_string(), value);
            }
        }
        state.metrics.kpi = values.clone();

        KpiSnapshot {
            agent_id: state.agent_id,
            run_id: state.run_id,
            values,
            recorded_at: Utc::now(),
        }
    }
}

fn calculate_kpi(kind: KpiKind, state: &AgentState) -> Option<f64> {
    let metrics = &state.metrics;
    match kind {
        KpiKind::Fcr => {
            let escalated = state.tool_calls.iter().any(|tc| tc.tool_name == ESCALATE_TOOL);
            Some(if escalated { 0.0 } else { 1.0 })
        }
        KpiKind::LeadTime => metrics.duration_ms.map(|ms| ms as f64 / 1000.0 / 60.0),
        KpiKind::CostPerRun => Some(metrics.cost_usd),
        KpiKind::ToolEfficiency => {
            if metrics.tool_calls_count == 0 {
                return None;
            }
            let output = state.output.as_deref()?;
            Some(output.chars().count() as f64 / metrics.tool_calls_count as f64)
        }
    }
}
