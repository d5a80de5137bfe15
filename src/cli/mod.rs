use clap::{Parser, Subcommand};
use std::path::PathBuf;

use launchpad_workflow::workflow::StageParseError;
use launchpad_workflow::{Role, Stage};

pub mod commands;

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Site onboarding workflow: move sites through their lifecycle stages")]
#[command(long_about = "Launchpad tracks each site through a fixed sequence of stages, from creation \
                       to go-live. Transitions are checked against role grants and the one-step rule; \
                       admins may override the sequence. Every applied transition is audited.")]
pub struct Cli {
    /// Read configuration from FILE instead of launchpad.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override storage.state_dir
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new site at the first stage
    CreateSite {
        /// Identifier of the site
        site_id: String,
    },
    /// Request a stage transition for a site
    Transition {
        /// Identifier of the site
        site_id: String,
        /// Target stage
        #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
        to: Stage,
        /// Who is asking
        #[arg(long, value_name = "ID")]
        actor: String,
        /// Role of the actor: admin, ops_manager, deployment_engineer
        #[arg(long)]
        role: Role,
        /// Stage the caller believes the site is at (defaults to the stored stage)
        #[arg(long, value_name = "STAGE", value_parser = parse_stage)]
        from: Option<Stage>,
        /// Free-text reason recorded in the audit log
        #[arg(long)]
        reason: Option<String>,
    },
    /// List the stages a role may target from a stage
    Next {
        /// Current stage (key or workflow page name)
        #[arg(value_parser = parse_stage)]
        stage: Stage,
        /// Role asking
        #[arg(long)]
        role: Role,
    },
    /// Check whether a progression would be accepted
    Validate {
        #[arg(value_parser = parse_stage)]
        current: Stage,
        #[arg(value_parser = parse_stage)]
        target: Stage,
        /// Evaluate as an admin
        #[arg(long)]
        admin: bool,
    },
    /// Show the audit log of a site, newest first
    Audit {
        /// Identifier of the site
        site_id: String,
    },
    /// Count sites per stage
    Stats,
    /// Print the effective configuration as TOML
    Config,
}

/// Stage keys and their legacy spellings, falling back to the name of the
/// workflow page that records the stage.
fn parse_stage(raw: &str) -> Result<Stage, StageParseError> {
    raw.parse::<Stage>()
        .or_else(|err| Stage::from_page_name(raw.trim()).ok_or(err))
}
