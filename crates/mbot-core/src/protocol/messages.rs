//! Envelope types for the MBot Bridge JSON protocol.
//!
//! Every frame exchanged with the bridge server is a single JSON object with a
//! `"type"` discriminant and up to four optional fields:
//!
//! ```json
//! {"type":"request","channel":"MBOT_ODOMETRY"}
//! {"type":"publish","channel":"MBOT_VEL_CMD","dtype":"twist2D_t","data":{"vx":0.1,"vy":0,"wz":0}}
//! {"type":"response","channel":"HOSTNAME","dtype":"","data":"mbot-01"}
//! {"type":"error","data":"Bad MBot request. No channel: FOO"}
//! ```
//!
//! # Why is there no `Invalid` kind?
//!
//! Decoding can fail in many ways (not JSON, no `type`, unknown `type`, a
//! `channel` that is not a string).  Rather than overloading [`MessageKind`]
//! with a sentinel value, the decoder returns [`Decoded`], a sum type whose
//! `Invalid` arm cannot be confused with a real envelope and can never be
//! encoded back onto the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Message kind ──────────────────────────────────────────────────────────────

/// The `"type"` discriminant of an [`Envelope`].
///
/// Serialized in lowercase, exactly as the bridge server spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Connection initialisation handshake (carries no channel).
    Init,
    /// One-shot read of the latest value on a channel.
    Request,
    /// Fire-and-forget write to a channel.
    Publish,
    /// Server answer to a `Request`, or a push on a subscription.
    Response,
    /// Start streaming a channel over this connection.
    Subscribe,
    /// Stop streaming a channel over this connection.
    Unsubscribe,
    /// Server-side failure; `data` holds the diagnostic text.
    Error,
}

impl MessageKind {
    /// Every kind, in wire-declaration order.
    pub const ALL: [MessageKind; 7] = [
        MessageKind::Init,
        MessageKind::Request,
        MessageKind::Publish,
        MessageKind::Response,
        MessageKind::Subscribe,
        MessageKind::Unsubscribe,
        MessageKind::Error,
    ];

    /// Returns the wire spelling of this kind (the value of `"type"`).
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Init => "init",
            MessageKind::Request => "request",
            MessageKind::Publish => "publish",
            MessageKind::Response => "response",
            MessageKind::Subscribe => "subscribe",
            MessageKind::Unsubscribe => "unsubscribe",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognised [`MessageKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The unit of exchange with the bridge server.
///
/// Optional fields that are `None` are omitted from the encoded JSON, and a
/// field that is absent on the wire decodes as `None`.  `data` tracks presence
/// exactly: `"data": null` decodes to `Some(Value::Null)`, not `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message discriminant.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Wire channel name.  Absent for `init` and for most `error` replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Payload type tag, e.g. `"pose2D_t"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,

    /// Payload.  For `error` envelopes this is conventionally a string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub data: Option<Value>,

    /// Ask the server to answer with a raw binary frame instead of JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_bytes: Option<bool>,
}

/// Deserializes a field that is present on the wire, keeping an explicit
/// `null` as `Some(Value::Null)`.  Absent fields fall back to `#[serde(default)]`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Creates an envelope of `kind` with every optional field unset.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            channel: None,
            dtype: None,
            data: None,
            as_bytes: None,
        }
    }

    /// `{"type":"init"}`.
    pub fn init() -> Self {
        Self::new(MessageKind::Init)
    }

    /// A one-shot read of `channel`.
    pub fn request(channel: impl Into<String>) -> Self {
        Self::new(MessageKind::Request).with_channel(channel)
    }

    /// A write of `data` (tagged `dtype`) to `channel`.
    pub fn publish(channel: impl Into<String>, dtype: impl Into<String>, data: Value) -> Self {
        Self::new(MessageKind::Publish)
            .with_channel(channel)
            .with_dtype(dtype)
            .with_data(data)
    }

    /// A server answer carrying `data` for `channel`.
    pub fn response(channel: impl Into<String>, dtype: impl Into<String>, data: Value) -> Self {
        Self::new(MessageKind::Response)
            .with_channel(channel)
            .with_dtype(dtype)
            .with_data(data)
    }

    /// Start streaming `channel`.
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self::new(MessageKind::Subscribe).with_channel(channel)
    }

    /// Stop streaming `channel`.
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self::new(MessageKind::Unsubscribe).with_channel(channel)
    }

    /// A server-side error carrying `message` as its data.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(MessageKind::Error).with_data(Value::String(message.into()))
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = Some(dtype.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_as_bytes(mut self, as_bytes: bool) -> Self {
        self.as_bytes = Some(as_bytes);
        self
    }

    /// Returns the diagnostic text of an `error` envelope.
    ///
    /// String data is returned as-is; any other JSON value is rendered as
    /// compact JSON; missing data yields an empty string.
    pub fn error_text(&self) -> String {
        match &self.data {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

// ── Decode result ─────────────────────────────────────────────────────────────

/// Result of decoding one inbound frame.
///
/// Decoding never fails with an error: malformed input is the representable
/// terminal value [`Decoded::Invalid`], and callers branch on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed envelope with a recognised kind.
    Valid(Envelope),
    /// The frame could not be interpreted.  The string says why (for logs).
    Invalid(String),
}

impl Decoded {
    /// Returns the envelope if this is `Valid`.
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Decoded::Valid(envelope) => Some(envelope),
            Decoded::Invalid(_) => None,
        }
    }

    /// Returns the kind if this is `Valid`.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Decoded::Valid(envelope) => Some(envelope.kind),
            Decoded::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Decoded::Valid(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
