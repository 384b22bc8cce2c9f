//! Client configuration types.
//!
//! [`ClientConfig`] is the single source of truth for runtime settings.  It is
//! built from defaults, optionally overlaid with a TOML file (see
//! `infrastructure::config_file`), and finally with command-line flags.
//!
//! The domain layer never reads files or environment variables; it only
//! describes the settings.

use std::time::Duration;

/// Default bridge server port.
pub const DEFAULT_PORT: u16 = 5005;

/// Default bridge server host.
pub const DEFAULT_HOST: &str = "localhost";

/// All runtime configuration for talking to one bridge server.
///
/// # Example
///
/// ```rust
/// use mbot_client::domain::ClientConfig;
///
/// let cfg = ClientConfig::default();
/// assert_eq!(cfg.uri(), "ws://localhost:5005");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Hostname or IP address of the robot running the bridge server.
    pub host: String,

    /// TCP port of the bridge server's WebSocket listener.
    pub port: u16,

    /// Upper bound on the WebSocket handshake for each new connection.
    pub connect_timeout: Duration,

    /// Upper bound on a whole one-shot exchange (connect, send, answer).
    pub request_timeout: Duration,

    /// How long to wait for the server to acknowledge a close frame.
    pub close_timeout: Duration,
}

impl ClientConfig {
    /// Returns a default config pointed at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// The WebSocket URI of the bridge server, `ws://{host}:{port}`.
    pub fn uri(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    /// | Field           | Default     |
    /// |-----------------|-------------|
    /// | host            | `localhost` |
    /// | port            | `5005`      |
    /// | connect_timeout | 5 seconds   |
    /// | request_timeout | 5 seconds   |
    /// | close_timeout   | 2 seconds   |
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
