//! Infrastructure layer for mbot-client.
//!
//! Everything that touches the outside world:
//!
//! - `ws_connection` – the WebSocket [`Connector`](crate::application::Connector)
//!   built on tokio-tungstenite, one task per connection
//! - `config_file`   – TOML configuration loading

pub mod config_file;
pub mod ws_connection;

pub use config_file::{load_config, ConfigError};
pub use ws_connection::WsConnector;
