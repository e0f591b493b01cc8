//! Agentry CLI entry point.
//!
//! Binary name: `agentry`
//!
//! Parses CLI arguments, sets up tracing, initializes the database and the
//! agent service, then dispatches to the command handler.

mod cli;
mod state;

use agentry_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use clap::Parser;
use clap_complete::generate;

use cli::{AgentCommand, Cli, Commands, UserCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,agentry=debug",
        _ => "trace",
    };
    let options = TracingOptions::new(filter)
        .json(cli.log_json)
        .otel(cli.otel);
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agentry", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let result = dispatch(&state, cli.command, cli.json).await;
    shutdown_tracing();
    result
}

async fn dispatch(state: &AppState, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            agent_id,
            input,
            user,
        } => cli::run::run_agent(state, agent_id, &input, user, json).await,

        Commands::Status { run_id, details } => {
            cli::run::show_status(state, run_id, details, json).await
        }

        Commands::Resume {
            run_id,
            approval_id,
        } => cli::run::resume_run(state, run_id, approval_id, json).await,

        Commands::Kpis { agent_id } => cli::run::show_kpis(state, agent_id, json).await,

        Commands::Approvals { approver } => {
            cli::approval::list_pending(state, approver, json).await
        }

        Commands::RequestApproval {
            run_id,
            tool_call_id,
            action,
            context,
            approver,
        } => {
            cli::approval::request_approval(
                state,
                run_id,
                &tool_call_id,
                &action,
                context.as_deref(),
                approver,
                json,
            )
            .await
        }

        Commands::Approve {
            approval_id,
            approver,
        } => cli::approval::approve(state, approval_id, approver, json).await,

        Commands::Reject {
            approval_id,
            approver,
            reason,
        } => cli::approval::reject(state, approval_id, approver, reason, json).await,

        Commands::Agent { command } => match command {
            AgentCommand::Import { file } => cli::agent::import_agent(state, &file, json).await,
            AgentCommand::List { tenant } => cli::agent::list_agents(state, tenant, json).await,
            AgentCommand::Show { agent_id } => cli::agent::show_agent(state, agent_id, json).await,
            AgentCommand::Persona {
                agent_id,
                name,
                tone,
                style,
                goal,
                constraints,
            } => {
                let update = cli::agent::persona_update(name, tone, style, goal, constraints);
                cli::agent::update_persona(state, agent_id, update, json).await
            }
        },

        Commands::Roles => cli::agent::list_roles(json),

        Commands::User { command } => match command {
            UserCommand::Add {
                tenant,
                name,
                email,
                roles,
                id,
            } => cli::user::add_user(state, tenant, name, email, roles, id, json).await,
        },

        Commands::Config => cli::config::show_config(state, json),

        Commands::Completions { .. } => Ok(()),
    }
}
