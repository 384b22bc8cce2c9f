//! Text codec for MBot Bridge envelopes.
//!
//! Wire format: one JSON object per WebSocket text frame.
//!
//! ```text
//! {"type":<kind>[,"channel":<string>][,"dtype":<string>][,"data":<any>][,"as_bytes":<bool>]}
//! ```
//!
//! Both directions are total: [`encode`] cannot fail for a well-typed
//! [`Envelope`], and [`decode`] maps every malformed frame to
//! [`Decoded::Invalid`] instead of returning an error.

use serde_json::Value;
use tracing::{trace, warn};

use crate::protocol::messages::{Decoded, Envelope};

/// Encodes an [`Envelope`] as a JSON text frame.
///
/// Unset optional fields are omitted.  The output length is unbounded.
///
/// # Examples
///
/// ```rust
/// use mbot_core::protocol::{encode, Envelope};
///
/// let text = encode(&Envelope::request("HOSTNAME"));
/// assert_eq!(text, r#"{"type":"request","channel":"HOSTNAME"}"#);
/// ```
pub fn encode(envelope: &Envelope) -> String {
    // Strings, bools and `serde_json::Value` always serialize; the fallback
    // only keeps the signature total.
    serde_json::to_string(envelope).unwrap_or_else(|e| {
        warn!("envelope serialization failed, sending bare type: {e}");
        format!(r#"{{"type":"{}"}}"#, envelope.kind)
    })
}

/// Decodes one inbound text frame.
///
/// Returns [`Decoded::Invalid`] when the text is not JSON, is not a JSON
/// object, lacks a `"type"` field, names an unknown type, or carries a known
/// field with the wrong JSON type.  Unknown extra fields are ignored.
///
/// # Examples
///
/// ```rust
/// use mbot_core::protocol::{decode, Decoded, MessageKind};
///
/// let decoded = decode(r#"{"type":"response","channel":"HOSTNAME","data":"mbot-01"}"#);
/// assert_eq!(decoded.kind(), Some(MessageKind::Response));
///
/// assert!(matches!(decode(r#"{"channel":"HOSTNAME"}"#), Decoded::Invalid(_)));
/// ```
pub fn decode(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return invalid(format!("not valid JSON: {e}")),
    };

    let Some(object) = value.as_object() else {
        return invalid("envelope is not a JSON object".to_string());
    };

    match object.get("type") {
        None => return invalid("envelope has no type field".to_string()),
        Some(Value::String(_)) => {}
        Some(other) => return invalid(format!("type field is not a string: {other}")),
    }

    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => Decoded::Valid(envelope),
        Err(e) => invalid(e.to_string()),
    }
}

fn invalid(reason: String) -> Decoded {
    trace!("invalid envelope: {reason}");
    Decoded::Invalid(reason)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
