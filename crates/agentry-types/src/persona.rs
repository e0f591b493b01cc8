//! Persona configuration rendered into an agent's system prompt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    /// One of `formal`, `casual`, `friendly`, `professional`, `technical`,
    /// or free text used verbatim.
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

fn default_tone() -> String {
    "professional".to_string()
}

impl PersonaConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tone: default_tone(),
            style: None,
            goal: None,
            constraints: Vec::new(),
            examples: Vec::new(),
        }
    }
}

/// Partial update applied by `PersonaEngine::update_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaUpdate {
    pub name: Option<String>,
    pub tone: Option<String>,
    pub style: Option<String>,
    pub goal: Option<String>,
    pub constraints: Option<Vec<String>>,
    pub examples: Option<Vec<String>>,
}

impl PersonaConfig {
    pub fn apply(&mut self, update: PersonaUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(tone) = update.tone {
            self.tone = tone;
        }
        if update.style.is_some() {
            self.style = update.style;
        }
        if update.goal.is_some() {
            self.goal = update.goal;
        }
        if let Some(constraints) = update.constraints {
            self.constraints = constraints;
        }
        if let Some(examples) = update.examples {
            self.examples = examples;
        }
    }
}
