//! Application layer for mbot-client.
//!
//! Knows *what* happens on a connection but not *how* bytes move: the
//! transport is reached only through the [`Connector`](connection::Connector)
//! port.
//!
//! - `connection`   – the port: events, commands, `Connector` trait
//! - `exchange`     – pure state machine for one request or publish
//! - `subscription` – pure state machine for one subscription entry
//! - `session`      – actor owning the subscription table
//! - `robot`        – typed convenience facade
//! - `error`        – `ClientError`

pub mod connection;
pub mod error;
pub mod exchange;
pub mod robot;
pub mod session;
pub mod subscription;

pub use connection::{
    Connection, ConnectionCommand, ConnectionEndpoint, ConnectionEvent, Connector,
};
pub use error::ClientError;
pub use robot::MBot;
pub use session::{Session, SubscriptionHandler};
