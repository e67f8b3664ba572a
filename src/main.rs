// ABOUTME: Entry point for zimchat: chat with a language model over selected notebook pages.
// ABOUTME: Parses CLI args, sets up logging, loads config, and launches the app.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zimchat::agent::OpenAiTransport;
use zimchat::app::App;
use zimchat::config::Config;

/// Chat with a language model using notebook pages as context.
#[derive(Debug, Parser)]
#[command(name = "zimchat", version)]
struct Cli {
    /// Config file (default: ~/.zimchat/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pages file to load instead of the configured default.
    #[arg(long)]
    pages: Option<PathBuf>,

    /// Model to request, overriding the config.
    #[arg(long)]
    model: Option<String>,

    /// Ask for complete replies instead of streamed ones.
    #[arg(long)]
    no_stream: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load local .env if present, then the user's secrets file.
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_path(Config::secrets_env_path());

    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    config.apply_env();
    if let Some(model) = cli.model {
        config.model = model;
    }
    if cli.no_stream {
        config.stream = false;
    }

    info!(api_url = %config.api_url, stream = config.stream, "starting zimchat");

    let transport = Arc::new(OpenAiTransport::from_config(&config)?);
    let contexts = App::load_initial_pages(&config, cli.pages.as_deref());
    App::new(config, contexts, transport)
        .with_config_path(config_path)
        .run()
        .await
}
