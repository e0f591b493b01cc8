//! Agent definitions: the configuration a run is started from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluation::KpiKind;
use crate::memory::MemoryConfig;
use crate::persona::PersonaConfig;
use crate::policy::PolicyConfig;

/// Built-in agent roles. Anything else is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    ItSupport,
    Sales,
    Marketing,
    Legal,
    Meeting,
    Custom,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ItSupport => "it-support",
            AgentRole::Sales => "sales",
            AgentRole::Marketing => "marketing",
            AgentRole::Legal => "legal",
            AgentRole::Meeting => "meeting",
            AgentRole::Custom => "custom",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "it-support" => Ok(AgentRole::ItSupport),
            "sales" => Ok(AgentRole::Sales),
            "marketing" => Ok(AgentRole::Marketing),
            "legal" => Ok(AgentRole::Legal),
            "meeting" => Ok(AgentRole::Meeting),
            "custom" => Ok(AgentRole::Custom),
            other => Err(format!("unknown agent role type: '{other}'")),
        }
    }
}

/// A tool the model may call, described with a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Stored configuration of one agent.
///
/// `role_type` stays a string so unknown roles surface at run start rather
/// than failing to deserialize older records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub role_type: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_tokens: u32,
    pub persona: PersonaConfig,
    #[serde(default)]
    pub policies: PolicyConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default = "default_kpis")]
    pub kpis: Vec<KpiKind>,
    /// Overrides the engine-wide iteration cap when set.
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2000
}

fn default_kpis() -> Vec<KpiKind> {
    vec![
        KpiKind::Fcr,
        KpiKind::LeadTime,
        KpiKind::CostPerRun,
        KpiKind::ToolEfficiency,
    ]
}

impl AgentDefinition {
    /// Minimal definition with defaults, mostly for tests and imports.
    pub fn new(tenant_id: Uuid, name: impl Into<String>, role_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            persona: PersonaConfig::named(name.clone()),
            name,
            role_type: role_type.into(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_output_tokens(),
            policies: PolicyConfig::default(),
            memory: MemoryConfig::default(),
            tools: Vec::new(),
            kpis: default_kpis(),
            max_iterations: None,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Result<AgentRole, String> {
        self.role_type.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_role_parse_known_and_unknown() {
        assert_eq!("it-support".parse::<AgentRole>().unwrap(), AgentRole::ItSupport);
        assert_eq!("legal".parse::<AgentRole>().unwrap(), AgentRole::Legal);
        let err = "astronaut".parse::<AgentRole>().unwrap_err();
        assert!(err.contains("astronaut"));
    }

    #[test]
    fn test_definition_defaults_from_json() {
        let def: AgentDefinition = serde_json::from_value(serde_json::json!({
            "id": Uuid::now_v7(),
            "tenant_id": Uuid::now_v7(),
            "name": "Helpdesk",
            "role_type": "it-support",
            "persona": { "name": "Helpdesk" }
        }))
        .unwrap();
        assert_eq!(def.model, "gpt-4");
        assert_eq!(def.temperature, 0.7);
        assert_eq!(def.max_tokens, 2000);
        assert_eq!(def.memory.max_tokens, 4000);
        assert_eq!(def.memory.compression_threshold, 3000);
        assert!(def.policies.pii_detection);
        assert_eq!(def.kpis.len(), 4);
        assert_eq!(def.role().unwrap(), AgentRole::ItSupport);
    }
}
