//! mbot-client library crate.
//!
//! An async client for the MBot Bridge server: one-shot requests and
//! publishes, long-lived subscriptions, and a typed facade over the robot's
//! channels.
//!
//! # Architecture
//!
//! ```text
//! Application code
//!         ↕
//! [mbot-client]
//!   ├── domain/           ClientConfig, SubscriptionState
//!   ├── application/      Session actor, exchange/subscription state
//!   │                     machines, MBot facade, Connector port
//!   └── infrastructure/
//!         ├── ws_connection  WebSocket Connector (tokio-tungstenite)
//!         └── config_file    TOML configuration
//!         ↕
//! MBot Bridge server (JSON envelopes over WebSocket, port 5005)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `mbot-core`; it reaches the
//!   network only through the [`Connector`](application::Connector) trait.
//! - `infrastructure` implements that trait and loads configuration.

use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ClientError, MBot, Session, SubscriptionHandler};
pub use domain::ClientConfig;

use infrastructure::WsConnector;

/// Builds an [`MBot`] that talks to the bridge server described by `config`.
///
/// No connection is opened until the first call.  Must be called from within
/// a tokio runtime.
pub fn connect(config: ClientConfig) -> MBot {
    tracing::debug!("bridge client for {}", config.uri());
    let connector = Arc::new(WsConnector::new(&config));
    MBot::new(Session::new(connector, &config))
}
