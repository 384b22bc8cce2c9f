//! Protocol module containing the envelope types and the JSON text codec.

pub mod codec;
pub mod messages;

pub use codec::{decode, encode};
pub use messages::{Decoded, Envelope, MessageKind, UnknownKind};
