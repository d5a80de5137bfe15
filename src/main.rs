use anyhow::Result;
use clap::Parser;

use launchpad_workflow::{
    cancel_pair, init_telemetry, open_store, WorkflowConfig, WorkflowEngine,
};

mod cli;

use cli::commands::{dispatch, show_config, CommandContext};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_loaded = WorkflowConfig::load_env_file()?;
    let mut config = WorkflowConfig::load_from(cli.config.as_deref())?;
    if let Some(state_dir) = cli.state_dir {
        config.storage.state_dir = state_dir;
    }

    init_telemetry(&config.observability)?;
    if env_loaded {
        tracing::info!("Loaded environment variables from .env file");
    }

    if let Commands::Config = cli.command {
        return show_config(&config);
    }

    let store = open_store(&config).await?;
    let engine = WorkflowEngine::from_config(store, &config);

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight store calls");
            handle.cancel();
        }
    });

    let ctx = CommandContext {
        engine,
        json: cli.json,
        cancel,
    };
    dispatch(cli.command, &ctx).await
}
