//! Domain layer for mbot-client.
//!
//! Pure types with no I/O, no async, and no transport knowledge: the client
//! configuration and the lifecycle states a subscription moves through.

pub mod config;
pub mod state;

pub use config::ClientConfig;
pub use state::SubscriptionState;
