//! # cavekit CLI
//!
//! Command-line interface for cavekit deployments.

mod commands;
mod site;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cavekit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the deployment file
    #[arg(long, default_value = "cavekit.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the cave over HTTP
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Resolve a path against the spelunk tree and print the render target
    Resolve {
        /// Location path, e.g. "./editor" or "editor/settings"
        path: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the cave's address book
    Registry {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate the deployment file without serving it
    Check {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { port } => commands::serve(&cli.config, port).await,
        Commands::Resolve { path, json } => commands::resolve(&cli.config, &path, json),
        Commands::Registry { json } => commands::registry(&cli.config, json),
        Commands::Check { json } => commands::check(&cli.config, json),
    }
}
