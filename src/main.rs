//! Streaming Chat
//!
//! Entry point: `serve` runs the chat endpoint, `chat` talks to one from
//! the terminal.

use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use streaming_chat::config::{AppConfig, Cli, Command};
use streaming_chat::{server, terminal};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED); stderr keeps the chat transcript on stdout clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }

    let cli = Cli::parse();
    let config = match AppConfig::from_cli(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                name: "config.loaded",
                host = %config.server.host,
                port = config.server.port,
                "Configuration loaded"
            );
            server::start_server(Arc::new(config)).await
        }
        Command::Chat => terminal::run(&config).await,
    }
}
