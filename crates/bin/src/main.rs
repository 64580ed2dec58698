use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod entry;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sortview=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::List(args) => commands::list::run(args, cli.format).await,
    }
}
