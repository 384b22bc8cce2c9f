//! Error type returned by every client operation.

use std::sync::Arc;
use std::time::Duration;

use mbot_core::PayloadError;
use thiserror::Error;

/// Failure of a request, publish, subscribe or unsubscribe call.
///
/// Cloneable so that several callers waiting on the same subscription can
/// each receive the same outcome.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server answered with an `error` envelope.
    #[error("MBot API error: {message} on channel: {channel}")]
    Remote { channel: String, message: String },

    /// The reply was neither a `response` nor an `error`, or could not be
    /// decoded at all.
    #[error("cannot parse response on channel: {channel}")]
    Protocol { channel: String },

    /// The connection could not be opened, broke, or closed before an answer.
    #[error("connection error on channel {channel}: {reason}")]
    Connection { channel: String, reason: String },

    /// The call is not allowed in the subscription's current state.
    #[error("invalid state on channel {channel}: {reason}")]
    InvalidState { channel: String, reason: String },

    /// No answer arrived within the request timeout.
    #[error("request on channel {channel} timed out after {after:?}")]
    Timeout { channel: String, after: Duration },

    /// The answer arrived but its `data` is not the expected payload type.
    #[error("unexpected payload on channel {channel}: {source}")]
    Payload {
        channel: String,
        #[source]
        source: Arc<PayloadError>,
    },

    /// The session has shut down.
    #[error("session is closed")]
    SessionClosed,
}

impl ClientError {
    /// The channel the failure relates to, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            ClientError::Remote { channel, .. }
            | ClientError::Protocol { channel }
            | ClientError::Connection { channel, .. }
            | ClientError::InvalidState { channel, .. }
            | ClientError::Timeout { channel, .. }
            | ClientError::Payload { channel, .. } => Some(channel),
            ClientError::SessionClosed => None,
        }
    }

    pub(crate) fn payload(channel: impl Into<String>, source: PayloadError) -> Self {
        ClientError::Payload {
            channel: channel.into(),
            source: Arc::new(source),
        }
    }
}
