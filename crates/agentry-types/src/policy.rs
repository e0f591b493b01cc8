//! Policy configuration: guardrails, approval rules, PII detection, and the
//! decision returned by the enforcer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a guardrail matches on. Each variant has its own matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardrailTrigger {
    /// Exact tool name.
    ToolName { name: String },
    /// Case-insensitive substring of the input text or serialized tool input.
    Keyword { keyword: String },
    /// Numeric (or numeric-string) field of a tool input strictly above `threshold`.
    NumericThreshold { field: String, threshold: f64 },
}

/// Effect of a matched guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    Block,
    RequireApproval,
    Warn,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardrail {
    pub id: String,
    pub name: String,
    pub trigger: GuardrailTrigger,
    pub action: GuardrailAction,
    #[serde(default)]
    pub message: Option<String>,
}

/// What makes an approval rule fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalRuleTrigger {
    ToolName {
        name: String,
    },
    Threshold {
        #[serde(default = "default_threshold_field")]
        field: String,
        threshold: f64,
    },
}

fn default_threshold_field() -> String {
    "cost".to_string()
}

/// A rule that makes human sign-off mandatory, independent of guardrails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflowRule {
    pub id: String,
    pub trigger: ApprovalRuleTrigger,
    #[serde(default)]
    pub approver_role: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// All policy settings for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub guardrails: Vec<Guardrail>,
    #[serde(default = "default_pii_detection")]
    pub pii_detection: bool,
    #[serde(default)]
    pub approval_rules: Vec<ApprovalWorkflowRule>,
}

fn default_pii_detection() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            guardrails: Vec::new(),
            pii_detection: default_pii_detection(),
            approval_rules: Vec::new(),
        }
    }
}

/// Kinds of personally identifiable information the enforcer detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Iban,
    CreditCard,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::Iban => "iban",
            PiiKind::CreditCard => "credit_card",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Approval rule that made sign-off mandatory, if any.
    #[serde(default)]
    pub approval_rule_id: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn require_approval(reason: impl Into<String>, rule_id: Option<String>) -> Self {
        Self {
            allowed: true,
            requires_approval: true,
            reason: Some(reason.into()),
            approval_rule_id: rule_id,
        }
    }
}
