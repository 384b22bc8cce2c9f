//! Subscription lifecycle states.

use std::fmt;

/// Where a subscription entry is in its lifecycle.
///
/// ```text
/// connecting ──first message──▶ active ──unsubscribe──▶ closing
///     │                           │                        │
///     └──────── error / failed / closed ───────────────────┴──▶ closed
/// ```
///
/// `Closed` is terminal; the session removes the entry as soon as it is
/// reached, so a snapshot never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Connection requested, no message received yet.
    Connecting,
    /// At least one message received; pushes go to the handler.
    Active,
    /// Local unsubscribe requested; waiting for the connection to close.
    Closing,
    /// Connection terminated.
    Closed,
}

impl SubscriptionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionState::Connecting => "connecting",
            SubscriptionState::Active => "active",
            SubscriptionState::Closing => "closing",
            SubscriptionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
