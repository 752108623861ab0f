//! Archivist CLI - backup and restore for record collections and media trees
//!
//! This is the main entry point for the archivist command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Create(args) => commands::create::run(args, config).await,
        Commands::List(args) => commands::list::run(args, config).await,
        Commands::Restore(args) => commands::restore::run(args, config).await,
        Commands::Cleanup(args) => commands::cleanup::run(args, config).await,
        Commands::Verify(args) => commands::verify::run(args, config).await,
        Commands::Schedule(args) => commands::schedule::run(args, config).await,
        Commands::Delete(args) => commands::delete::run(args, config).await,
        Commands::Rebuild(args) => commands::rebuild::run(args, config).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
