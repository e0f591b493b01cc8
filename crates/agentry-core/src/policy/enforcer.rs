//! Policy enforcement for run inputs and tool calls.
//!
//! Input checks run PII detection first, then every guardrail that applies
//! to free text. Tool-call checks run guardrails, then approval rules.
//! `warn` and `log` guardrails never change the decision; they only emit an
//! audit record on the `agentry::audit` target.

use agentry_types::policy::{
    ApprovalRuleTrigger, ApprovalWorkflowRule, Guardrail, GuardrailAction, GuardrailTrigger,
    PiiKind, PolicyConfig, PolicyDecision,
};

use super::pii;

pub struct PolicyEnforcer {
    config: PolicyConfig,
}

impl PolicyEnforcer {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn detect_pii(&self, text: &str) -> Vec<PiiKind> {
        pii::detect_pii(text)
    }

    pub fn redact_pii(&self, text: &str) -> String {
        pii::redact_pii(text)
    }

    /// Validate the user input of a run.
    pub fn validate_input(&self, text: &str) -> PolicyDecision {
        if self.config.pii_detection {
            let kinds = pii::detect_pii(text);
            if !kinds.is_empty() {
                let names: Vec<&str> = kinds.iter().map(PiiKind::as_str).collect();
                tracing::info!(
                    target: "agentry::audit",
                    pii = %names.join(","),
                    "input blocked: PII detected"
                );
                return PolicyDecision::block(format!(
                    "PII detected: {}. Input must be redacted.",
                    names.join(", ")
                ));
            }
        }

        let mut decision = PolicyDecision::allow();
        for guardrail in &self.config.guardrails {
            let GuardrailTrigger::Keyword { keyword } = &guardrail.trigger else {
                continue;
            };
            if !contains_ignore_case(text, keyword) {
                continue;
            }
            if let Some(outcome) = apply_action(guardrail, None) {
                if !outcome.allowed {
                    return outcome;
                }
                decision = outcome;
            }
        }
        decision
    }

    /// Validate one tool call requested by the model.
    pub fn validate_tool_call(&self, tool_name: &str, input: &serde_json::Value) -> PolicyDecision {
        let mut gated: Option<PolicyDecision> = None;

        for guardrail in &self.config.guardrails {
            if !guardrail_matches_tool_call(&guardrail.trigger, tool_name, input) {
                continue;
            }
            if let Some(outcome) = apply_action(guardrail, Some(tool_name)) {
                if !outcome.allowed {
                    return outcome;
                }
                gated.get_or_insert(outcome);
            }
        }

        if let Some(rule) = self.find_approval_rule(tool_name, input) {
            tracing::debug!(tool = tool_name, rule_id = %rule.id, "approval rule matched");
            let reason = gated
                .and_then(|d| d.reason)
                .unwrap_or_else(|| format!("Approval required by rule: {}", rule.id));
            return PolicyDecision::require_approval(reason, Some(rule.id.clone()));
        }

        gated.unwrap_or_else(PolicyDecision::allow)
    }

    fn find_approval_rule(
        &self,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> Option<&ApprovalWorkflowRule> {
        self.config.approval_rules.iter().find(|rule| match &rule.trigger {
            ApprovalRuleTrigger::ToolName { name } => name == tool_name,
            ApprovalRuleTrigger::Threshold { field, threshold } => {
                numeric_field(input, field).is_some_and(|v| v > *threshold)
            }
        })
    }
}

fn guardrail_matches_tool_call(
    trigger: &GuardrailTrigger,
    tool_name: &str,
    input: &serde_json::Value,
) -> bool {
    match trigger {
        GuardrailTrigger::ToolName { name } => name == tool_name,
        GuardrailTrigger::Keyword { keyword } => contains_ignore_case(&input.to_string(), keyword),
        GuardrailTrigger::NumericThreshold { field, threshold } => {
            numeric_field(input, field).is_some_and(|v| v > *threshold)
        }
    }
}

/// Returns `None` for actions that do not affect the decision.
fn apply_action(guardrail: &Guardrail, tool_name: Option<&str>) -> Option<PolicyDecision> {
    match guardrail.action {
        GuardrailAction::Block => {
            tracing::info!(
                target: "agentry::audit",
                guardrail = %guardrail.name,
                tool = tool_name.unwrap_or("-"),
                "blocked by guardrail"
            );
            Some(PolicyDecision::block(guardrail.message.clone().unwrap_or_else(|| {
                format!("Action blocked by guardrail: {}", guardrail.name)
            })))
        }
        GuardrailAction::RequireApproval => Some(PolicyDecision::require_approval(
            guardrail
                .message
                .clone()
                .unwrap_or_else(|| format!("Approval required for: {}", guardrail.name)),
            None,
        )),
        GuardrailAction::Warn => {
            tracing::warn!(
                target: "agentry::audit",
                guardrail = %guardrail.name,
                tool = tool_name.unwrap_or("-"),
                message = guardrail.message.as_deref().unwrap_or(""),
                "guardrail warning"
            );
            None
        }
        GuardrailAction::Log => {
            tracing::info!(
                target: "agentry::audit",
                guardrail = %guardrail.name,
                tool = tool_name.unwrap_or("-"),
                message = guardrail.message.as_deref().unwrap_or(""),
                "guardrail matched"
            );
            None
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Read a number (or numeric string) at a dotted path of a JSON object.
fn numeric_field(input: &serde_json::Value, path: &str) -> Option<f64> {
    let value = path
        .split('.')
        .try_fold(input, |current, key| current.get(key))?;
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
