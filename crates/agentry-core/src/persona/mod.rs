//! Persona engine: renders an agent's system prompt.
//!
//! The persona block (identity, goal, style, constraints, examples) depends
//! only on configuration and is cached until `update_config` changes it.
//! Long-term facts are appended per call from the run's own memory.

use std::sync::{PoisonError, RwLock};

use agentry_types::persona::{PersonaConfig, PersonaUpdate};
use agentry_types::run::AgentState;

pub struct PersonaEngine {
    inner: RwLock<Inner>,
}

struct Inner {
    config: PersonaConfig,
    cached: Option<String>,
}

impl PersonaEngine {
    pub fn new(config: PersonaConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                config,
                cached: None,
            }),
        }
    }

    pub fn config(&self) -> PersonaConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    /// Build the system prompt for `state`.
    pub fn generate_system_prompt(&self, state: &AgentState) -> String {
        let persona = self.persona_block();
        let facts = &state.memory.long_term_facts;
        if facts.is_empty() {
            return persona;
        }

        let mut lines = vec![persona, "\nImportant facts from earlier conversation:".to_string()];
        for (key, value) in facts {
            lines.push(format!("- {key}: {value}"));
        }
        lines.join("\n")
    }

    /// Merge a partial update into the persona and drop the cache.
    pub fn update_config(&self, update: PersonaUpdate) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.config.apply(update);
        inner.cached = None;
    }

    fn persona_block(&self) -> String {
        if let Some(cached) = &self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cached
        {
            return cached.clone();
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let rendered = render_persona(&inner.config);
        inner.cached = Some(rendered.clone());
        rendered
    }
}

fn tone_description(tone: &str) -> &str {
    match tone {
        "formal" => "formal, courteous",
        "casual" => "relaxed, approachable",
        "friendly" => "friendly, welcoming",
        "professional" => "professional, matter-of-fact",
        "technical" => "technical, precise",
        other => other,
    }
}

fn render_persona(config: &PersonaConfig) -> String {
    let mut parts = vec![format!(
        "You are {}, a {} assistant.",
        config.name,
        tone_description(&config.tone)
    )];

    if let Some(goal) = &config.goal {
        parts.push(format!("\nYour primary goal: {goal}"));
    }

    if let Some(style) = &config.style {
        parts.push(format!("\nYour communication style: {style}"));
    }

    if !config.constraints.is_empty() {
        parts.push("\nImportant constraints:".to_string());
        for (i, constraint) in config.constraints.iter().enumerate() {
            parts.push(format!("{}. {constraint}", i + 1));
        }
    }

    if !config.examples.is_empty() {
        parts.push("\nExamples of how you communicate:".to_string());
        for (i, example) in config.examples.iter().enumerate() {
            parts.push(format!("\nExample {}:", i + 1));
            parts.push(example.clone());
        }
    }

    parts.join("\n")
}
