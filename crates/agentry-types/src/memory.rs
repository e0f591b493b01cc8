//! Memory types: the per-run conversational context and its budget settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::AgentMessage;

/// Conversational context of one run.
///
/// `token_count` is an estimate, not an exact tokenizer count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    #[serde(default)]
    pub history: Vec<AgentMessage>,
    /// Facts accumulated across compressions (e.g. `names`).
    #[serde(default)]
    pub long_term_facts: BTreeMap<String, serde_json::Value>,
    /// Summary of messages dropped by compression.
    #[serde(default)]
    pub compressed_history: Option<String>,
    #[serde(default)]
    pub token_count: u32,
    pub max_tokens: u32,
}

impl MemoryContext {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }
}

/// Token budget and retention settings for an agent's memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Ceiling for the prompt actually sent to the model.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Estimated token count above which history is compressed.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: u32,
    /// Messages kept verbatim after compression.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Write memory through to the durable store.
    #[serde(default = "default_long_term_storage")]
    pub long_term_storage: bool,
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_compression_threshold() -> u32 {
    3000
}

fn default_keep_recent() -> usize {
    10
}

fn default_long_term_storage() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            compression_threshold: default_compression_threshold(),
            keep_recent: default_keep_recent(),
            long_term_storage: default_long_term_storage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_tokens, 4000);
        assert_eq!(config.compression_threshold, 3000);
        assert_eq!(config.keep_recent, 10);
        assert!(config.long_term_storage);
    }

    #[test]
    fn test_memory_config_partial_toml() {
        let config: MemoryConfig = toml::from_str("max_tokens = 8000").unwrap();
        assert_eq!(config.max_tokens, 8000);
        assert_eq!(config.compression_threshold, 3000);
    }

    #[test]
    fn test_memory_context_new_is_empty() {
        let ctx = MemoryContext::new(2000);
        assert_eq!(ctx.max_tokens, 2000);
        assert!(ctx.history.is_empty());
        assert!(ctx.compressed_history.is_none());
        assert_eq!(ctx.token_count, 0);
    }
}
