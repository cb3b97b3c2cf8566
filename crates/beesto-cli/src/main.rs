//! Beesto CLI - AI coding assistant for sandboxed web projects
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::{Result, bail};
use clap::Parser as _;
use cli::{Cli, Commands};

mod cli;
mod handlers;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Logging creates the state directory, so check before it does
    if let Commands::Tree { project, .. } = &cli.command
        && !project.is_dir()
    {
        bail!("Project directory not found: {}", project.display());
    }
    handlers::init_logging(cli.command.project()).await?;

    match cli.command {
        Commands::Run {
            request,
            project,
            endpoint,
        } => handlers::handle_run(&project, &request, endpoint).await,
        Commands::Tree { project, search } => handlers::handle_tree(&project, search).await,
        Commands::Init { project, install } => handlers::handle_init(&project, install).await,
    }
}
