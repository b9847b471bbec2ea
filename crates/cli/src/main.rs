//! GridParley CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Run episodes against the simulator
//! - `config`  — Show, locate or initialise the configuration
//! - `models`  — List supported models
//! - `doctor`  — Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;
mod recorder;

#[derive(Parser)]
#[command(
    name = "gridparley",
    about = "GridParley — multi-agent LLM episodes on a grid world",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "GRIDPARLEY_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run episodes against the simulator
    Run(commands::run::RunArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List supported models
    Models,

    /// Diagnose configuration and connectivity
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
        },
        Commands::Models => commands::models::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
