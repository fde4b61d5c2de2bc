//! confit CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "confit")]
#[command(about = "Dependency-aware configuration deployment", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, env = "CONFIT_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy configs against the dry-run client and report the outcome
    Validate {
        /// JSON file with the configs to deploy
        #[arg(long)]
        objects: PathBuf,
        /// Engine settings
        #[arg(long, env = "CONFIT_SETTINGS")]
        settings: Option<PathBuf>,
        /// Append a deployment report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the dependency layers of a set of configs
    Graph {
        /// JSON file with the configs
        #[arg(long)]
        objects: PathBuf,
    },
    /// Summarize a deployment report
    Report {
        /// Path to the report file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Validate {
            objects,
            settings,
            report,
        } => {
            commands::validate::run(&objects, settings.as_deref(), report).await?;
        }
        Commands::Graph { objects } => {
            commands::graph::run(&objects)?;
        }
        Commands::Report { path } => {
            commands::report::run(&path)?;
        }
    }

    Ok(())
}
