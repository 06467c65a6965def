//! Configuration for the echo server and client.
//!
//! The server supports both command-line arguments and a TOML configuration
//! file. CLI arguments take precedence over config file values. The client
//! is configured from the command line only.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the echo server
#[derive(Parser, Debug, Default)]
#[command(name = "line-echo-server")]
#[command(author = "line-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP echo server", long_about = None)]
pub struct ServerArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:5678)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen backlog depth
    #[arg(short = 'b', long)]
    pub backlog: Option<u32>,

    /// Maximum number of concurrently served connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Maximum line length in bytes, excluding the newline
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Idle timeout per connection in seconds (0 = no timeout)
    #[arg(short = 't', long)]
    pub idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Listen backlog depth
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
        }
    }
}

/// Per-connection limits
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum line length in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Idle timeout in seconds (0 disables it)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5678".to_string()
}

fn default_backlog() -> u32 {
    10
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_line_length() -> usize {
    64 * 1024 // 64 KiB
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backlog: u32,
    pub max_connections: usize,
    pub max_line_length: usize,
    /// `None` when the idle timeout is disabled.
    pub idle_timeout: Option<Duration>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    /// Resolve parsed CLI arguments, reading the TOML file they point at.
    pub fn from_args(cli: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: ServerArgs, toml_config: TomlConfig) -> Self {
        let idle_secs = cli
            .idle_timeout
            .unwrap_or(toml_config.connection.idle_timeout);

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections)
                .max(1),
            max_line_length: cli
                .max_line_length
                .unwrap_or(toml_config.connection.max_line_length)
                .max(1),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(ServerArgs::default(), TomlConfig::default())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Command-line arguments for the one-shot client
#[derive(Parser, Debug, Clone)]
#[command(name = "line-echo-client")]
#[command(author = "line-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "Send one line to a line-echo server and print the reply", long_about = None)]
pub struct ClientArgs {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:5678")]
    pub server: String,

    /// Message to send
    #[arg(short, long, default_value = "Hello from client!")]
    pub message: String,

    /// Send the message without a trailing newline
    #[arg(long)]
    pub no_newline: bool,

    /// Close the write side after sending
    #[arg(long)]
    pub shutdown_write: bool,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub connect_timeout: u64,

    /// How long to wait for the reply, in seconds
    #[arg(long, default_value_t = 5)]
    pub read_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub message: String,
    pub append_newline: bool,
    pub shutdown_write: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            server: args.server,
            message: args.message,
            append_newline: !args.no_newline,
            shutdown_write: args.shutdown_write,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            read_timeout: Duration::from_secs(args.read_timeout),
        }
    }
}
