//! TOML configuration file for the client.
//!
//! Every field is optional; missing fields take the [`ClientConfig`]
//! defaults, and a missing file is the same as an empty one.
//!
//! ```toml
//! [bridge]
//! host = "mbot-01.local"
//! port = 5005
//!
//! [timeouts]
//! connect_ms = 5000
//! request_ms = 5000
//! close_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::config::{ClientConfig, DEFAULT_HOST, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// On-disk layout of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// Where the bridge server lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
    #[serde(default = "default_close_ms")]
    pub close_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_ms() -> u64 {
    millis(ClientConfig::default().connect_timeout)
}

fn default_request_ms() -> u64 {
    millis(ClientConfig::default().request_timeout)
}

fn default_close_ms() -> u64 {
    millis(ClientConfig::default().close_timeout)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            request_ms: default_request_ms(),
            close_ms: default_close_ms(),
        }
    }
}

impl From<ConfigFile> for ClientConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            host: file.bridge.host,
            port: file.bridge.port,
            connect_timeout: Duration::from_millis(file.timeouts.connect_ms),
            request_timeout: Duration::from_millis(file.timeouts.request_ms),
            close_timeout: Duration::from_millis(file.timeouts.close_ms),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a field has the
/// wrong type.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.into())
}

/// Loads configuration from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}; using defaults", path.display());
            Ok(ClientConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
