//! Built-in agent role presets.
//!
//! Each role brings a default communication style and a set of actions that
//! always need human sign-off. Presets only fill gaps; anything the agent
//! definition configures explicitly wins.

use agentry_types::agent::{AgentDefinition, AgentRole};
use agentry_types::policy::{ApprovalRuleTrigger, ApprovalWorkflowRule};

#[derive(Debug)]
pub struct RolePreset {
    pub role: AgentRole,
    pub display_name: &'static str,
    pub description: &'static str,
    pub style: &'static str,
    pub expertise: &'static [&'static str],
    /// Tool names that require approval by default.
    pub approval_required: &'static [&'static str],
    pub max_cost_per_run: f64,
}

static PRESETS: &[RolePreset] = &[
    RolePreset {
        role: AgentRole::ItSupport,
        display_name: "IT-Support Assist",
        description: "Answers IT questions, troubleshoots problems and handles support requests",
        style: "Structured step-by-step instructions with technical details explained clearly",
        expertise: &[
            "troubleshooting",
            "system administration",
            "network issues",
            "software installation",
            "hardware support",
        ],
        approval_required: &["system_changes", "password_reset", "access_grant", "data_deletion"],
        max_cost_per_run: 0.50,
    },
    RolePreset {
        role: AgentRole::Sales,
        display_name: "Sales-Backoffice Assist",
        description: "Qualifies leads, prepares quotes and maintains the CRM",
        style: "Customer-oriented, clearly structured, goal-driven",
        expertise: &[
            "lead qualification",
            "quotes",
            "CRM maintenance",
            "customer communication",
            "contract administration",
        ],
        approval_required: &["price_changes", "contract_modifications", "customer_data_deletion"],
        max_cost_per_run: 0.30,
    },
    RolePreset {
        role: AgentRole::Meeting,
        display_name: "Meeting-Assist",
        description: "Writes minutes, tracks action items and sends follow-ups",
        style: "Short and concise, structured, focused on action items",
        expertise: &[
            "meeting minutes",
            "action item tracking",
            "calendar management",
            "follow-up communication",
        ],
        approval_required: &["calendar_changes", "external_meeting_invites"],
        max_cost_per_run: 0.20,
    },
    RolePreset {
        role: AgentRole::Marketing,
        display_name: "Marketing-Assist",
        description: "Creates content, manages social media and plans campaigns",
        style: "Creative, on-brand, audience-oriented",
        expertise: &[
            "content creation",
            "social media",
            "campaign planning",
            "SEO",
            "analytics",
        ],
        approval_required: &["public_posts", "external_publications", "campaign_launches"],
        max_cost_per_run: 0.40,
    },
    RolePreset {
        role: AgentRole::Legal,
        display_name: "Legal-Assist",
        description: "Reviews contracts, checks compliance and drafts legal documentation",
        style: "Legally precise and cautious, with disclaimers where uncertain",
        expertise: &["contract review", "compliance", "legal documentation", "GDPR"],
        approval_required: &["legal_advice", "contract_modifications", "compliance_decisions"],
        max_cost_per_run: 0.60,
    },
];

/// Preset of a built-in role. `Custom` has none.
pub fn preset(role: AgentRole) -> Option<&'static RolePreset> {
    PRESETS.iter().find(|p| p.role == role)
}

pub fn all_presets() -> &'static [RolePreset] {
    PRESETS
}

/// Resolve the role of `agent` and merge its preset defaults.
///
/// Fails when the role type is unknown.
pub fn apply_role_defaults(agent: &mut AgentDefinition) -> Result<AgentRole, String> {
    let role = agent.role()?;
    let Some(preset) = preset(role) else {
        return Ok(role);
    };

    if agent.persona.style.is_none() {
        agent.persona.style = Some(preset.style.to_string());
    }

    for tool in preset.approval_required {
        let covered = agent.policies.approval_rules.iter().any(|rule| {
            matches!(&rule.trigger, ApprovalRuleTrigger::ToolName { name } if name.as_str() == *tool)
        });
        if !covered {
            agent.policies.approval_rules.push(ApprovalWorkflowRule {
                id: format!("{}:{tool}", role.as_str()),
                trigger: ApprovalRuleTrigger::ToolName {
                    name: (*tool).to_string(),
                },
                approver_role: None,
                timeout_secs: None,
            });
        }
    }

    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_every_builtin_role_has_preset() {
        for role in [
            AgentRole::ItSupport,
            AgentRole::Sales,
            AgentRole::Marketing,
            AgentRole::Legal,
            AgentRole::Meeting,
        ] {
            assert!(preset(role).is_some(), "missing preset for {role}");
        }
        assert!(preset(AgentRole::Custom).is_none());
    }

    #[test]
    fn test_apply_defaults_adds_approval_rules_once() {
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "it-support");
        apply_role_defaults(&mut agent).unwrap();
        let count = agent.policies.approval_rules.len();
        assert_eq!(count, 4);
        assert!(agent.persona.style.is_some());

        apply_role_defaults(&mut agent).unwrap();
        assert_eq!(agent.policies.approval_rules.len(), count);
    }

    #[test]
    fn test_explicit_style_is_kept() {
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Closer", "sales");
        agent.persona.style = Some("Very terse".to_string());
        apply_role_defaults(&mut agent).unwrap();
        assert_eq!(agent.persona.style.as_deref(), Some("Very terse"));
    }

    #[test]
    fn test_unknown_role_is_error() {
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Pilot", "astronaut");
        assert!(apply_role_defaults(&mut agent).is_err());
    }
}
