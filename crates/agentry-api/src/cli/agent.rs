//! Agent definition commands and the role preset listing.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;
use uuid::Uuid;

use agentry_core::roles::all_presets;
use agentry_types::agent::AgentDefinition;
use agentry_types::persona::PersonaUpdate;

use super::format::{relative_time, table, truncate};
use crate::state::AppState;

/// Register an agent from a JSON definition file. Re-importing the same ID
/// replaces the stored definition.
pub async fn import_agent(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let agent = parse_definition(&raw)
        .with_context(|| format!("invalid agent definition in {}", file.display()))?;

    state.service.register_agent(&agent).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agent)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Registered {} ({})",
        style("✓").green().bold(),
        style(&agent.name).cyan().bold(),
        agent.role_type
    );
    println!("  {}", style(agent.id).dim());
    println!();
    Ok(())
}

fn parse_definition(raw: &str) -> Result<AgentDefinition> {
    Ok(serde_json::from_str(raw)?)
}

/// Collect CLI flags into a persona update. Unset flags keep their value.
pub fn persona_update(
    name: Option<String>,
    tone: Option<String>,
    style: Option<String>,
    goal: Option<String>,
    constraints: Vec<String>,
) -> PersonaUpdate {
    PersonaUpdate {
        name,
        tone,
        style,
        goal,
        constraints: (!constraints.is_empty()).then_some(constraints),
        examples: None,
    }
}

pub async fn update_persona(
    state: &AppState,
    agent_id: Uuid,
    update: PersonaUpdate,
    json: bool,
) -> Result<()> {
    let agent = state.service.update_persona(&agent_id, update).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agent.persona)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Persona of {} is now {} ({})",
        style("✓").green().bold(),
        style(&agent.name).cyan().bold(),
        style(&agent.persona.name).bold(),
        agent.persona.tone
    );
    println!();
    Ok(())
}

pub async fn list_agents(state: &AppState, tenant: Option<Uuid>, json: bool) -> Result<()> {
    let agents = state.service.list_agents(tenant.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!();
        println!(
            "  {} No agents found. Register one with: {}",
            style("i").blue().bold(),
            style("agentry agent import <file.json>").yellow()
        );
        println!();
        return Ok(());
    }

    let now = chrono::Utc::now();
    let mut rows = table(&["Name", "ID", "Role", "Model", "Tools", "Created"]);
    for agent in &agents {
        rows.add_row(vec![
            Cell::new(&agent.name).fg(Color::Cyan),
            Cell::new(agent.id).fg(Color::DarkGrey),
            Cell::new(&agent.role_type),
            Cell::new(&agent.model),
            Cell::new(agent.tools.len()),
            Cell::new(relative_time(&agent.created_at, now)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{rows}");
    println!();
    println!(
        "  {} agent{}",
        style(agents.len()).bold(),
        if agents.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

pub async fn show_agent(state: &AppState, agent_id: Uuid, json: bool) -> Result<()> {
    let agent = state.service.get_agent(&agent_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agent)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&agent.name).cyan().bold());
    println!("  {}", style(agent.id).dim());
    println!();

    println!("  {}", style("── Details ──").dim());
    println!("  {}        {}", style("Role:").bold(), agent.role_type);
    println!(
        "  {}       {} (temperature {}, max {} tokens)",
        style("Model:").bold(),
        agent.model,
        agent.temperature,
        agent.max_tokens
    );
    println!("  {}     {}", style("Tenant:").bold(), agent.tenant_id);
    if let Some(cap) = agent.max_iterations {
        println!("  {} {}", style("Iterations:").bold(), cap);
    }
    println!();

    println!("  {}", style("── Persona ──").dim());
    println!("  {}        {}", style("Name:").bold(), agent.persona.name);
    println!("  {}        {}", style("Tone:").bold(), agent.persona.tone);
    if let Some(goal) = &agent.persona.goal {
        println!("  {}        {}", style("Goal:").bold(), goal);
    }
    for constraint in &agent.persona.constraints {
        println!("  {}           {}", style("-").dim(), constraint);
    }
    println!();

    if !agent.tools.is_empty() {
        let mut tools = table(&["Tool", "Description"]);
        for tool in &agent.tools {
            tools.add_row(vec![
                Cell::new(&tool.name).fg(Color::Cyan),
                Cell::new(truncate(&tool.description, 70)),
            ]);
        }
        println!("  {}", style("── Tools ──").dim());
        println!("{tools}");
        println!();
    }

    let policies = &agent.policies;
    println!("  {}", style("── Policies ──").dim());
    println!(
        "  {} guardrails, {} approval rules, PII detection {}",
        policies.guardrails.len(),
        policies.approval_rules.len(),
        if policies.pii_detection { "on" } else { "off" }
    );
    println!();
    Ok(())
}

/// List the built-in roles with the tools that always need sign-off.
pub fn list_roles(json: bool) -> Result<()> {
    let presets = all_presets();

    if json {
        let value: Vec<_> = presets
            .iter()
            .map(|p| {
                serde_json::json!({
                    "role": p.role.as_str(),
                    "name": p.display_name,
                    "description": p.description,
                    "style": p.style,
                    "expertise": p.expertise,
                    "approval_required": p.approval_required,
                    "max_cost_per_run": p.max_cost_per_run,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut rows = table(&["Role", "Name", "Needs approval", "Max cost"]);
    for preset in presets {
        rows.add_row(vec![
            Cell::new(preset.role.as_str()).fg(Color::Cyan),
            Cell::new(preset.display_name),
            Cell::new(preset.approval_required.join(", ")),
            Cell::new(format!("${:.2}", preset.max_cost_per_run)),
        ]);
    }

    println!();
    println!("{rows}");
    println!();
    Ok(())
}
