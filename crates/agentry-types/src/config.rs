//! Engine configuration types.
//!
//! `EngineConfig` represents `config.toml` in the data directory. Every field
//! has a default so a missing or partial file still yields a usable engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite URL. Defaults to `{data_dir}/agentry.db` when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Iteration cap applied to agents that do not set their own.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub tool_service: ServiceEndpoint,

    #[serde(default)]
    pub notification_service: ServiceEndpoint,

    /// Public base URL used to build approval links in notifications.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Pricing used to estimate run cost.
    #[serde(default)]
    pub model_pricing: Vec<ModelPricing>,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_gateway_url() -> String {
    "http://localhost:3001".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            default_max_iterations: default_max_iterations(),
            llm: LlmSettings::default(),
            tool_service: ServiceEndpoint::default(),
            notification_service: ServiceEndpoint::default(),
            gateway_url: default_gateway_url(),
            model_pricing: Vec::new(),
        }
    }
}

/// OpenAI-compatible completion gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_api_key_env() -> String {
    "AGENTRY_LLM_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// An optional HTTP collaborator. `url = None` disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Cost information for a model name pattern (`gpt-4*` style prefix glob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model_pattern: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}
