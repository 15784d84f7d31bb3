//! contextweave CLI: the main entry point.
//!
//! Commands:
//! - `init`    Write a default config file
//! - `config`  Show, locate or validate the configuration
//! - `replay`  Run a scripted conversation against a markdown vault

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use contextweave_config::{AppConfig, LoggingConfig};
use contextweave_core::ChainKind;

mod commands;
mod compactor;
mod vault;

#[derive(Parser)]
#[command(
    name = "contextweave",
    about = "contextweave: layered prompt context for multi-turn chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.contextweave/config.toml
    #[arg(long, global = true, env = "CONTEXTWEAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Replay a scripted conversation and report how each turn was layered
    Replay {
        /// Conversation script (JSON)
        script: PathBuf,

        /// Root of the markdown vault notes are read from
        #[arg(long)]
        vault: PathBuf,

        /// Override the chain kind from the script and config
        #[arg(long)]
        chain: Option<ChainKind>,

        /// Print each turn's full processed text
        #[arg(long)]
        show_prompt: bool,

        /// Print the LLM view of the conversation as JSON when done
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Validate the configuration
    Validate,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config problems are reported by the commands themselves.
    let logging = load_config(cli.config.as_ref())
        .map(|c| c.logging)
        .unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    match cli.command {
        Commands::Init { force } => commands::init::run(cli.config.as_deref(), force).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_cmd::show(load_config(cli.config.as_ref())?).await?
            }
            ConfigAction::Path => commands::config_cmd::path(cli.config.as_deref()).await?,
            ConfigAction::Validate => commands::config_cmd::validate(cli.config.as_ref()).await?,
        },
        Commands::Replay {
            script,
            vault,
            chain,
            show_prompt,
            json,
        } => {
            let config = load_config(cli.config.as_ref())?;
            let options = commands::replay::ReplayOptions {
                chain,
                show_prompt,
                json,
            };
            commands::replay::run(&config, &script, &vault, options).await?
        }
    }

    Ok(())
}
