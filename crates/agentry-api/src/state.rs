//! Application state wiring the engine to its concrete collaborators.
//!
//! `AgentService` is generic over the store; `AppState` pins it to
//! `SqliteStore` and builds the HTTP clients from `EngineConfig`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentry_core::llm::BoxLlmProvider;
use agentry_core::notify::{BoxNotifier, NotifierChain};
use agentry_core::service::AgentService;
use agentry_core::tool::{BoxToolExecutor, NoToolExecutor};
use agentry_infra::config::{database_url, ensure_data_dir, load_engine_config, resolve_data_dir};
use agentry_infra::llm::HttpLlmProvider;
use agentry_infra::notify::{EmailToolNotifier, NotificationServiceNotifier};
use agentry_infra::sqlite::SqliteStore;
use agentry_infra::tool::HttpToolExecutor;
use agentry_types::config::EngineConfig;

pub type ConcreteAgentService = AgentService<SqliteStore>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConcreteAgentService>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire
    /// the service.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir()?;
        Self::with_data_dir(&data_dir).await
    }

    pub async fn with_data_dir(data_dir: &Path) -> anyhow::Result<Self> {
        ensure_data_dir(data_dir).await?;
        let config = load_engine_config(data_dir).await?;

        let store = SqliteStore::connect(&database_url(&config, data_dir)).await?;
        let service = AgentService::new(
            Arc::new(store),
            build_llm(&config)?,
            build_tools(&config)?,
            build_notifier(&config)?,
            config.clone(),
        );

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");
        Ok(Self {
            service: Arc::new(service),
            config,
            data_dir: data_dir.to_path_buf(),
        })
    }
}

fn build_llm(config: &EngineConfig) -> anyhow::Result<BoxLlmProvider> {
    Ok(BoxLlmProvider::new(HttpLlmProvider::from_settings(&config.llm)?))
}

fn build_tools(config: &EngineConfig) -> anyhow::Result<BoxToolExecutor> {
    Ok(match HttpToolExecutor::from_endpoint(&config.tool_service)? {
        Some(executor) => BoxToolExecutor::new(executor),
        None => {
            tracing::warn!("no tool service configured; tool calls will fail");
            BoxToolExecutor::new(NoToolExecutor)
        }
    })
}

/// Notification service first, email through the tool service as fallback.
fn build_notifier(config: &EngineConfig) -> anyhow::Result<NotifierChain> {
    let primary = match config.notification_service.url.as_deref() {
        Some(url) => Some(BoxNotifier::new(NotificationServiceNotifier::new(
            url,
            &config.gateway_url,
            std::time::Duration::from_secs(config.notification_service.timeout_secs),
        )?)),
        None => None,
    };

    let fallback = HttpToolExecutor::from_endpoint(&config.tool_service)?
        .map(|tools| BoxNotifier::new(EmailToolNotifier::new(tools, &config.gateway_url)));

    Ok(NotifierChain::new(primary, fallback))
}
