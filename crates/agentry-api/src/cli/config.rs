//! `agentry config`: where the engine keeps its data and what it loaded.

use anyhow::Result;
use console::style;

use agentry_infra::config::database_url;

use crate::state::AppState;

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config_report(state))?);
        return Ok(());
    }

    let config = &state.config;
    let endpoint = |url: &Option<String>| url.clone().unwrap_or_else(|| "disabled".to_string());

    println!();
    println!("  {}", style("── Storage ──").dim());
    println!("  {}   {}", style("Data dir:").bold(), state.data_dir.display());
    println!(
        "  {}   {}",
        style("Database:").bold(),
        database_url(config, &state.data_dir)
    );
    println!();

    println!("  {}", style("── Engine ──").dim());
    println!(
        "  {} {}",
        style("Iterations:").bold(),
        config.default_max_iterations
    );
    println!(
        "  {}        {} (key from ${}, {}s timeout)",
        style("LLM:").bold(),
        config.llm.base_url,
        config.llm.api_key_env,
        config.llm.timeout_secs
    );
    println!(
        "  {}      {}",
        style("Tools:").bold(),
        endpoint(&config.tool_service.url)
    );
    println!(
        "  {}     {}",
        style("Notify:").bold(),
        endpoint(&config.notification_service.url)
    );
    println!("  {}    {}", style("Gateway:").bold(), config.gateway_url);
    println!(
        "  {}    {} model pattern{}",
        style("Pricing:").bold(),
        config.model_pricing.len(),
        if config.model_pricing.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

fn config_report(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "data_dir": state.data_dir.display().to_string(),
        "database_url": database_url(&state.config, &state.data_dir),
        "config": state.config,
    })
}
