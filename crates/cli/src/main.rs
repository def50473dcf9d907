//! Zema CLI: the main entry point.
//!
//! Commands:
//! - `chat`    : Interactive or single-message chat with the local model
//! - `models`  : List models installed on the inference service
//! - `doctor`  : Diagnose the service, model and configuration
//! - `onboard` : Write a default config file
//! - `config`  : Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "zema",
    about = "Zema — privacy-first assistant on your own machine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.zema/config.toml
    #[arg(long, global = true, env = "ZEMA_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Scene description to pass as vision context
        #[arg(long)]
        vision: Option<String>,

        /// System prompt preset (main, vision, tools, ethiopian)
        #[arg(long)]
        preset: Option<String>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,
    },

    /// List installed models
    Models,

    /// Diagnose system health
    Doctor,

    /// Initialize configuration
    Onboard,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // A broken config must not stop `doctor` or `config validate` from reporting it.
    let loaded = commands::load_config(config_path);
    let log_level = loaded.as_ref().map_or("info", |c| c.log_level.as_str());
    init_tracing(cli.verbose, log_level);

    match cli.command {
        Commands::Chat {
            message,
            stream,
            vision,
            preset,
            model,
        } => {
            let config = loaded?;
            let options = commands::chat::ChatOptions {
                message,
                stream,
                vision,
                preset,
                model,
            };
            commands::chat::run(config, options).await?;
        }
        Commands::Models => commands::models::run(loaded?).await?,
        Commands::Doctor => return commands::doctor::run(config_path).await,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so answers on stdout stay clean.
fn init_tracing(verbose: bool, config_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
