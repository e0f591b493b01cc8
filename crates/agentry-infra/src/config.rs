//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.agentry/` by default),
//! falls back to defaults when the file is missing or malformed, then applies
//! `AGENTRY_*` environment overrides.

use std::path::{Path, PathBuf};

use agentry_types::config::EngineConfig;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "AGENTRY_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot determine home directory; set {DATA_DIR_ENV}")]
    NoHomeDir,

    #[error("invalid value for {var}: '{value}'")]
    InvalidOverride { var: String, value: String },

    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `$AGENTRY_DATA_DIR`, else `~/.agentry`.
pub fn resolve_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".agentry"))
        .ok_or(ConfigError::NoHomeDir)
}

/// Create the data directory if needed.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), ConfigError> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|source| ConfigError::DataDir {
            path: data_dir.to_path_buf(),
            source,
        })
}

/// Load `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or malformed file: logs a warning and returns defaults.
pub async fn load_config_file(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Apply `AGENTRY_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("AGENTRY_DATABASE_URL") {
        config.database_url = Some(url);
    }
    if let Some(url) = get("AGENTRY_LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Some(secs) = get("AGENTRY_LLM_TIMEOUT_SECS") {
        config.llm.timeout_secs = parse_override("AGENTRY_LLM_TIMEOUT_SECS", &secs)?;
    }
    if let Some(url) = get("AGENTRY_TOOL_SERVICE_URL") {
        config.tool_service.url = Some(url);
    }
    if let Some(url) = get("AGENTRY_NOTIFICATION_SERVICE_URL") {
        config.notification_service.url = Some(url);
    }
    if let Some(url) = get("AGENTRY_GATEWAY_URL") {
        config.gateway_url = url;
    }
    if let Some(max) = get("AGENTRY_MAX_ITERATIONS") {
        let max: u32 = parse_override("AGENTRY_MAX_ITERATIONS", &max)?;
        if max == 0 {
            return Err(ConfigError::InvalidOverride {
                var: "AGENTRY_MAX_ITERATIONS".to_string(),
                value: "0".to_string(),
            });
        }
        config.default_max_iterations = max;
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Config file plus process environment overrides.
pub async fn load_engine_config(data_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let mut config = load_config_file(data_dir).await;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    Ok(config)
}

/// The configured database URL, or `agentry.db` inside `data_dir`.
pub fn database_url(config: &EngineConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| crate::sqlite::pool::database_url_for(data_dir))
}
