//! Evaluation results and KPI types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory outcome of an evaluation hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default)]
    pub should_escalate: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl EvaluationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            should_retry: false,
            should_escalate: false,
            reason: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            ..Self::pass()
        }
    }
}

/// KPIs an agent can track per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    /// First-contact resolution: 1 unless the run escalated.
    Fcr,
    /// Minutes from start to end of the run.
    LeadTime,
    CostPerRun,
    /// Output characters per tool call.
    ToolEfficiency,
}

impl KpiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKind::Fcr => "fcr",
            KpiKind::LeadTime => "lead_time",
            KpiKind::CostPerRun => "cost_per_run",
            KpiKind::ToolEfficiency => "tool_efficiency",
        }
    }
}

impl fmt::Display for KpiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KPI values captured for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub agent_id: Uuid,
    pub run_id: Uuid,
    pub values: BTreeMap<String, f64>,
    pub recorded_at: DateTime<Utc>,
}

/// KPI aggregate over an agent's runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub fcr_rate: f64,
    pub avg_lead_time_minutes: f64,
    pub avg_cost_usd: f64,
    /// `None` when no run called a tool.
    pub tool_efficiency: Option<f64>,
}
