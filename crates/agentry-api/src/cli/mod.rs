//! CLI command definitions for the `agentry` binary.
//!
//! Uses clap derive macros. Run and approval operations are top-level verbs;
//! agent and user management are grouped under nouns.

pub mod agent;
pub mod approval;
pub mod config;
pub mod format;
pub mod run;
pub mod user;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Run role-based agents with human-in-the-loop approvals.
#[derive(Parser)]
#[command(name = "agentry", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through the OpenTelemetry stdout exporter.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an agent on a single input.
    Run {
        /// Agent ID.
        agent_id: Uuid,

        /// User request passed to the agent.
        input: String,

        /// User on whose behalf the agent runs.
        #[arg(long, env = "AGENTRY_USER_ID")]
        user: Option<Uuid>,
    },

    /// Show the status of a run.
    Status {
        /// Run ID.
        run_id: Uuid,

        /// Also list the run's tool calls and approvals.
        #[arg(long)]
        details: bool,
    },

    /// Resume a suspended run from an approval that is already approved.
    Resume {
        run_id: Uuid,
        approval_id: Uuid,
    },

    /// List pending approvals.
    Approvals {
        /// Only approvals addressed to this user.
        #[arg(long)]
        approver: Option<Uuid>,
    },

    /// Open an approval for a tool call of a run.
    RequestApproval {
        run_id: Uuid,

        /// Tool call the approval covers.
        tool_call_id: String,

        /// Action label shown to the approver.
        action: String,

        /// Extra context as a JSON object.
        #[arg(long)]
        context: Option<String>,

        /// Address the approval to this user.
        #[arg(long)]
        approver: Option<Uuid>,
    },

    /// Approve a pending approval and resume its run.
    Approve {
        approval_id: Uuid,

        /// User approving.
        #[arg(long, env = "AGENTRY_USER_ID")]
        approver: Uuid,
    },

    /// Reject a pending approval and fail its run.
    Reject {
        approval_id: Uuid,

        /// User rejecting.
        #[arg(long, env = "AGENTRY_USER_ID")]
        approver: Uuid,

        /// Reason recorded on the approval and the run.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show aggregated KPIs for an agent.
    Kpis {
        agent_id: Uuid,
    },

    /// Manage agent definitions.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// List the built-in role presets.
    Roles,

    /// Manage users.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Show the data directory and the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Register an agent from a JSON definition file.
    Import {
        /// Path to the definition.
        file: PathBuf,
    },

    /// List registered agents.
    #[command(alias = "ls")]
    List {
        /// Only agents of this tenant.
        #[arg(long)]
        tenant: Option<Uuid>,
    },

    /// Show an agent definition.
    Show {
        agent_id: Uuid,
    },

    /// Change an agent's persona. Later runs use the new system prompt.
    Persona {
        agent_id: Uuid,

        #[arg(long)]
        name: Option<String>,

        /// formal, casual, friendly, professional, technical or free text.
        #[arg(long)]
        tone: Option<String>,

        #[arg(long)]
        style: Option<String>,

        #[arg(long)]
        goal: Option<String>,

        /// Constraint; repeat for several. Replaces the existing list.
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Add or update a user.
    Add {
        #[arg(long)]
        tenant: Uuid,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,

        /// Role; repeat for several (admin and owner may approve).
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Keep an existing user ID instead of generating one.
        #[arg(long)]
        id: Option<Uuid>,
    },
}
