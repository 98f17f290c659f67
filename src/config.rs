use std::time::Duration;

use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::backend::BackendKind;
use crate::transport::ReplyMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Chat endpoint the client posts to
    #[arg(long, env = "CHAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Anti-forgery token sent with every request (and required by the server)
    #[arg(long, env = "CSRF_TOKEN")]
    pub csrf_token: Option<String>,

    /// How the client obtains replies
    #[arg(long, value_enum, env = "CHAT_MODE")]
    pub mode: Option<ReplyMode>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the chat endpoint
    Serve,
    /// Chat with an endpoint from the terminal
    Chat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub backend: BackendConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// When set, requests must carry this value in `X-CSRFToken`.
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    pub mode: ReplyMode,
    pub connect_timeout_secs: u64,
    /// Longest wait for the response or the next chunk.
    pub idle_timeout_secs: u64,
    pub max_response_bytes: usize,
    /// Pause before canned replies.
    pub reply_delay_ms: u64,
    pub welcome_message: String,
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

impl ResilienceConfig {
    /// Time allowed for a handler to produce response headers.
    pub fn request_timeout(&self) -> Duration {
        if self.timeout_disabled {
            Duration::from_secs(365 * 24 * 60 * 60) // 1 year
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Resolve configuration with priority CLI flag > env > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("client.endpoint", "http://127.0.0.1:8000/send_message/")?
            .set_default("client.mode", "stream")?
            .set_default("client.connect_timeout_secs", 10)?
            .set_default("client.idle_timeout_secs", 60)?
            .set_default("client.max_response_bytes", 1024 * 1024)?
            .set_default("client.reply_delay_ms", 0)?
            .set_default(
                "client.welcome_message",
                "Hello! I'm your assistant. How can I help you today?",
            )?
            .set_default("backend.kind", "ollama")?
            .set_default("backend.base_url", "http://localhost:11434")?
            .set_default("backend.model", "tinyllama")?
            .set_default(
                "backend.system_prompt",
                "You are a helpful, concise assistant.",
            )?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?;

        // 2. Config file: explicit path, else ./config.{yaml,toml,json} if present
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables (prefixed with CHAT_), e.g. CHAT_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides (clap already folded in their own env vars)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(endpoint) = &cli.endpoint {
            builder = builder.set_override("client.endpoint", endpoint.as_str())?;
        }
        if let Some(token) = &cli.csrf_token {
            builder = builder
                .set_override("client.csrf_token", token.as_str())?
                .set_override("server.csrf_token", token.as_str())?;
        }
        if let Some(mode) = cli.mode {
            let mode = match mode {
                ReplyMode::Stream => "stream",
                ReplyMode::Json => "json",
                ReplyMode::Canned => "canned",
            };
            builder = builder.set_override("client.mode", mode)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}
