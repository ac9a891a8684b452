mod agent;
mod commands;
mod config;
mod llm;
mod transport;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::prompt::Seed;
use crate::agent::{BotRuntime, ChatService};
use crate::commands::{CommandRegistry, CosenseClient};
use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};
use crate::transport::console::ConsoleTransport;

fn print_help() {
    println!(
        "\
stackchan-bot v{}

Stack-chan chat bot: answers mentions with an LLM that can search the
Cosense wiki and generate images.

USAGE:
    stackchan-bot [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/bot.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.
    A .env file in the working directory is loaded first.

    RUST_LOG          Log level filter for tracing
                      (e.g. debug, stackchan_bot=debug,warn)
    OPENAI_API_KEY    API key for chat completions and image generation

EXAMPLES:
    stackchan-bot                         # uses config/bot.toml
    stackchan-bot /etc/stackchan/bot.toml # custom config path
    RUST_LOG=debug stackchan-bot          # with debug logging (tool calls)",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("stackchan-bot v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stackchan_bot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Could not load .env: {e}");
        }
    }

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/bot.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    let openai = Arc::new(OpenAiClient::new(config.llm.clone(), config.image.clone()));
    let cosense = Arc::new(CosenseClient::new(&config.cosense)?);

    info!("Agent: {}", config.agent.name);
    info!("LLM: {}", openai.description());
    info!("Cosense project: {}", cosense.project());

    let registry = CommandRegistry::builtin(cosense, openai.clone());
    info!(
        "Commands: {} registered ({})",
        registry.len(),
        registry.names().join(", ")
    );

    let chat = ChatService::new(openai, Arc::new(registry))
        .with_seed(Seed::from_config(&config.agent))
        .with_max_attempts(config.agent.max_attempts);
    let mut runtime = BotRuntime::new(config.agent.clone(), chat);

    let (event_rx, cmd_tx) =
        ConsoleTransport::new(&config.agent.name, &config.agent.mention_name)
            .connect()
            .await?;

    tokio::select! {
        result = runtime.run(event_rx, cmd_tx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
            Ok(())
        }
    }
}
