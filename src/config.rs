//! Server configuration.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;
use thiserror::Error;

use crate::framing::DEFAULT_CHUNK_SIZE;

/// Command-line arguments for the `serve` subcommand.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:3000)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Per-connection working buffer size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Directory received frames are written into (one file per connection)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Drop received bytes instead of writing files
    #[arg(long)]
    pub discard: bool,
}

/// TOML configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub transfer: TransferSection,
}

/// Server-related configuration.
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
        }
    }
}

/// Transfer-related configuration.
#[derive(Debug, Deserialize)]
pub struct TransferSection {
    /// Per-connection working buffer size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Directory received frames are written into
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("received")
}

/// Where received frame bodies go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// One file per connection under this directory.
    Directory(PathBuf),
    /// Count and drop.
    Discard,
}

/// Final resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub chunk_size: usize,
    pub max_connections: usize,
    pub output: OutputMode,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load(args: &ServeArgs) -> Result<Self, ConfigError> {
        let toml_config = match &args.config {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
                        path: path.clone(),
                        source: e,
                    })?;
                toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
                    path: path.clone(),
                    source: e,
                })?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::merge(args, toml_config))
    }

    fn merge(args: &ServeArgs, toml: TomlConfig) -> Self {
        let output = if args.discard {
            OutputMode::Discard
        } else {
            OutputMode::Directory(args.output_dir.clone().unwrap_or(toml.transfer.output_dir))
        };

        Config {
            listen: args.listen.clone().unwrap_or(toml.server.listen),
            chunk_size: args.chunk_size.unwrap_or(toml.transfer.chunk_size),
            max_connections: args.max_connections.unwrap_or(toml.server.max_connections),
            output,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
