use anyhow::Result;
use serde::Serialize;

use launchpad_workflow::{CancelSignal, WorkflowConfig, WorkflowEngine};

use super::Commands;

pub mod advisory;
pub mod audit;
pub mod site;
pub mod stats;
pub mod transition;

/// Everything a command needs: the engine over the configured store, output
/// mode and the process-wide cancellation signal.
pub struct CommandContext {
    pub engine: WorkflowEngine,
    pub json: bool,
    pub cancel: CancelSignal,
}

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

pub async fn dispatch(command: Commands, ctx: &CommandContext) -> Result<()> {
    match command {
        Commands::CreateSite { site_id } => site::CreateSiteCommand::new(site_id).execute(ctx).await,
        Commands::Transition {
            site_id,
            to,
            actor,
            role,
            from,
            reason,
        } => {
            transition::TransitionCommand {
                site_id,
                to,
                actor,
                role,
                from,
                reason,
            }
            .execute(ctx)
            .await
        }
        Commands::Next { stage, role } => advisory::NextCommand { stage, role }.execute(ctx).await,
        Commands::Validate {
            current,
            target,
            admin,
        } => {
            advisory::ValidateCommand {
                current,
                target,
                admin,
            }
            .execute(ctx)
            .await
        }
        Commands::Audit { site_id } => audit::AuditCommand { site_id }.execute(ctx).await,
        Commands::Stats => stats::StatsCommand.execute(ctx).await,
        // Handled before the store is opened.
        Commands::Config => Ok(()),
    }
}

pub fn show_config(config: &WorkflowConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
