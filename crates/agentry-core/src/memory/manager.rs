//! MemoryManager -- per-run conversation history with compression.
//!
//! The `DashMap` is only a cache. With `long_term_storage` enabled every
//! change is written through to the `MemoryRepository`, so another process
//! can pick the context up after a restart.

use std::sync::{Arc, OnceLock};

use agentry_types::error::RepositoryError;
use agentry_types::memory::{MemoryConfig, MemoryContext};
use agentry_types::message::{AgentMessage, MessageRole};
use dashmap::DashMap;
use regex::Regex;
use uuid::Uuid;

use super::tokens::{estimate_context_tokens, estimate_tokens};
use crate::repository::MemoryRepository;

/// Fact key holding capitalised first/last name pairs.
pub const FACT_NAMES: &str = "names";

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-z]+ [A-Z][a-z]+)\b").expect("name pattern literal is valid")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct MemoryManager<M: MemoryRepository> {
    config: MemoryConfig,
    repo: Arc<M>,
    cache: DashMap<Uuid, MemoryContext>,
}

impl<M: MemoryRepository> MemoryManager<M> {
    pub fn new(config: MemoryConfig, repo: Arc<M>) -> Self {
        Self {
            config,
            repo,
            cache: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Current context of a run: cache, then durable store, then empty.
    pub async fn get_context(&self, run_id: &Uuid) -> Result<MemoryContext, MemoryError> {
        if let Some(ctx) = self.cache.get(run_id) {
            return Ok(ctx.clone());
        }

        if self.config.long_term_storage {
            if let Some(ctx) = self.repo.load_memory(run_id).await? {
                tracing::debug!(run_id = %run_id, messages = ctx.history.len(), "memory loaded from store");
                self.cache.insert(*run_id, ctx.clone());
                return Ok(ctx);
            }
        }

        let ctx = MemoryContext::new(self.config.max_tokens);
        self.cache.insert(*run_id, ctx.clone());
        Ok(ctx)
    }

    /// Append a message, compressing once the estimate crosses the threshold.
    pub async fn add_message(
        &self,
        run_id: &Uuid,
        message: AgentMessage,
    ) -> Result<MemoryContext, MemoryError> {
        let mut ctx = self.get_context(run_id).await?;
        ctx.token_count += estimate_tokens(&message.content);
        ctx.history.push(message);

        if ctx.token_count > self.config.compression_threshold {
            self.compress(run_id, &mut ctx);
        }

        self.store(run_id, &ctx).await?;
        Ok(ctx)
    }

    /// Compress a run's history if it is over the threshold.
    pub async fn compress_history(&self, run_id: &Uuid) -> Result<MemoryContext, MemoryError> {
        let mut ctx = self.get_context(run_id).await?;
        if ctx.token_count > self.config.compression_threshold && self.compress(run_id, &mut ctx) {
            self.store(run_id, &ctx).await?;
        }
        Ok(ctx)
    }

    pub async fn add_long_term_fact(
        &self,
        run_id: &Uuid,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), MemoryError> {
        let mut ctx = self.get_context(run_id).await?;
        ctx.long_term_facts.insert(key.into(), value);
        self.store(run_id, &ctx).await
    }

    pub async fn get_long_term_fact(
        &self,
        run_id: &Uuid,
        key: &str,
    ) -> Result<Option<serde_json::Value>, MemoryError> {
        Ok(self.get_context(run_id).await?.long_term_facts.get(key).cloned())
    }

    /// Seed the cache from a state snapshot when the store has nothing newer.
    pub async fn restore(&self, run_id: &Uuid, snapshot: MemoryContext) -> Result<MemoryContext, MemoryError> {
        if self.config.long_term_storage {
            if let Some(ctx) = self.repo.load_memory(run_id).await? {
                self.cache.insert(*run_id, ctx.clone());
                return Ok(ctx);
            }
        }
        self.cache.insert(*run_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Drop a finished run from the cache. The durable copy is kept.
    pub fn evict(&self, run_id: &Uuid) {
        self.cache.remove(run_id);
    }

    async fn store(&self, run_id: &Uuid, ctx: &MemoryContext) -> Result<(), MemoryError> {
        self.cache.insert(*run_id, ctx.clone());
        if self.config.long_term_storage {
            self.repo.save_memory(run_id, ctx).await?;
        }
        Ok(())
    }

    /// Returns false when the history is already within `keep_recent`.
    fn compress(&self, run_id: &Uuid, ctx: &mut MemoryContext) -> bool {
        let keep = self.config.keep_recent;
        if ctx.history.len() <= keep {
            return false;
        }

        let names = extract_names(&ctx.history);
        merge_facts(ctx, names);

        let split = ctx.history.len() - keep;
        let older: Vec<AgentMessage> = ctx.history.drain(..split).collect();
        let summary = summarize(&older);
        ctx.compressed_history = Some(match ctx.compressed_history.take() {
            Some(previous) => format!("{previous}\n{summary}"),
            None => summary,
        });
        ctx.token_count = estimate_context_tokens(ctx);

        tracing::debug!(
            run_id = %run_id,
            dropped = older.len(),
            kept = ctx.history.len(),
            token_count = ctx.token_count,
            "memory compressed"
        );
        true
    }
}

fn extract_names(messages: &[AgentMessage]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for message in messages
        .iter()
        .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
    {
        for capture in name_pattern().captures_iter(&message.content) {
            let name = capture[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn merge_facts(ctx: &mut MemoryContext, names: Vec<String>) {
    if names.is_empty() {
        return;
    }
    let entry = ctx
        .long_term_facts
        .entry(FACT_NAMES.to_string())
        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    if let serde_json::Value::Array(existing) = entry {
        for name in names {
            let value = serde_json::Value::String(name);
            if !existing.contains(&value) {
                existing.push(value);
            }
        }
    }
}

fn summarize(messages: &[AgentMessage]) -> String {
    let users = messages.iter().filter(|m| m.role == MessageRole::User).count();
    let assistants = messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .count();
    format!("Previous conversation: {users} user messages, {assistants} assistant replies.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;

    fn manager(config: MemoryConfig) -> (MemoryManager<InMemoryStore>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (MemoryManager::new(config, store.clone()), store)
    }

    fn hundred_token_message(i: usize) -> AgentMessage {
        let role = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        AgentMessage::new(role, "x".repeat(400))
    }

    #[tokio::test]
    async fn test_compresses_past_threshold() {
        let (memory, _) = manager(MemoryConfig {
            max_tokens: 4000,
            compression_threshold: 3000,
            ..Default::default()
        });
        let run_id = Uuid::now_v7();

        let mut ctx = MemoryContext::default();
        for i in 0..31 {
            ctx = memory.add_message(&run_id, hundred_token_message(i)).await.unwrap();
        }

        assert!(ctx.history.len() <= 10);
        let summary = ctx.compressed_history.as_deref().unwrap();
        assert_eq!(summary, "Previous conversation: 11 user messages, 10 assistant replies.");
        assert!(ctx.token_count < 3000);
    }

    #[tokio::test]
    async fn test_below_threshold_is_untouched() {
        let (memory, _) = manager(MemoryConfig::default());
        let run_id = Uuid::now_v7();
        for i in 0..12 {
            memory.add_message(&run_id, hundred_token_message(i)).await.unwrap();
        }

        let ctx = memory.compress_history(&run_id).await.unwrap();
        assert_eq!(ctx.history.len(), 12);
        assert!(ctx.compressed_history.is_none());
        assert_eq!(ctx.token_count, 1200);
    }

    #[tokio::test]
    async fn test_compress_is_idempotent() {
        let (memory, _) = manager(MemoryConfig {
            compression_threshold: 500,
            keep_recent: 2,
            ..Default::default()
        });
        let run_id = Uuid::now_v7();
        for i in 0..8 {
            memory.add_message(&run_id, hundred_token_message(i)).await.unwrap();
        }
        let once = memory.get_context(&run_id).await.unwrap();
        assert!(once.compressed_history.is_some());
        let twice = memory.compress_history(&run_id).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_short_history_over_threshold_keeps_everything() {
        let (memory, _) = manager(MemoryConfig {
            compression_threshold: 10,
            ..Default::default()
        });
        let run_id = Uuid::now_v7();
        let ctx = memory
            .add_message(&run_id, AgentMessage::user("Jane Doe ".repeat(20)))
            .await
            .unwrap();
        assert_eq!(ctx.history.len(), 1);
        assert!(ctx.compressed_history.is_none());
        assert!(ctx.long_term_facts.is_empty());
    }

    #[tokio::test]
    async fn test_names_extracted_and_deduplicated() {
        let (memory, _) = manager(MemoryConfig {
            compression_threshold: 20,
            keep_recent: 2,
            ..Default::default()
        });
        let run_id = Uuid::now_v7();
        for content in [
            "Hi, I am Jane Doe from accounting",
            "Thanks, Jane Doe, how can I help?",
            "My manager John Smith asked me",
            "Sure thing",
        ] {
            memory
                .add_message(&run_id, AgentMessage::user(content))
                .await
                .unwrap();
        }

        let names = memory
            .get_long_term_fact(&run_id, FACT_NAMES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(names, serde_json::json!(["Jane Doe", "John Smith"]));
    }

    #[tokio::test]
    async fn test_write_through_survives_new_manager() {
        let (memory, store) = manager(MemoryConfig::default());
        let run_id = Uuid::now_v7();
        memory
            .add_message(&run_id, AgentMessage::user("remember me"))
            .await
            .unwrap();
        memory
            .add_long_term_fact(&run_id, "ticket", serde_json::json!("INC-42"))
            .await
            .unwrap();

        let fresh = MemoryManager::new(MemoryConfig::default(), store);
        let ctx = fresh.get_context(&run_id).await.unwrap();
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.long_term_facts["ticket"], "INC-42");
    }

    #[tokio::test]
    async fn test_without_long_term_storage_nothing_is_persisted() {
        let (memory, store) = manager(MemoryConfig {
            long_term_storage: false,
            ..Default::default()
        });
        let run_id = Uuid::now_v7();
        memory
            .add_message(&run_id, AgentMessage::user("ephemeral"))
            .await
            .unwrap();
        assert!(store.load_memory(&run_id).await.unwrap().is_none());
    }
}
