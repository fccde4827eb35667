//! Endpoints CLI entry point.
//!
//! Binary name: `endpoints`
//!
//! Parses CLI arguments, initializes tracing, then dispatches to the command
//! handler. Only commands that touch the database build the engine.

mod cli;
mod state;

use clap::Parser;
use endpoints_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that only read the definition file need no database.
    let command = match cli.command {
        Commands::Check { application } => {
            return cli::check::check_application(&application, cli.json).await;
        }
        Commands::Hash(args) => return cli::execute::print_expected_hash(args, cli.json).await,
        command => command,
    };

    let state = AppState::init(cli.database_url).await?;

    match command {
        Commands::Execute(args) => cli::execute::execute_endpoint(&state, args, cli.json).await,
        Commands::Log { application, limit } => {
            cli::log::list_requests(&state, application.as_deref(), limit, cli.json).await
        }
        Commands::Config(args) => cli::app_config::set_config(&state, args, cli.json).await,
        Commands::Check { .. } | Commands::Hash(_) => Ok(()),
    }
}
