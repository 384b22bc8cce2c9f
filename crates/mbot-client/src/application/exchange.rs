//! One-shot exchange state machine.
//!
//! A one-shot exchange owns a connection opened for a single `request` or
//! `publish` and closed as soon as that exchange is done.  The machine is
//! pure: it consumes [`ConnectionEvent`]s and returns the [`ExchangeAction`]s
//! the caller must perform, so every transition can be tested without a
//! transport.
//!
//! ```text
//! request:  Opening ──Opened/send──▶ Awaiting ──message/close──▶ Settled
//! publish:  Opening ──Opened/send+close─────────────────────────▶ Settled
//!           any unsettled phase ──Failed / Closed / timeout─────▶ Settled
//! ```

use std::time::Duration;

use mbot_core::{decode, encode, Decoded, Envelope, MessageKind};
use serde_json::Value;
use tracing::{debug, trace};

use crate::application::connection::{ConnectionEvent, NORMAL_CLOSURE};
use crate::application::error::ClientError;

/// How a one-shot exchange ended.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// A `request` was answered with a `response` envelope.
    Responded(Envelope),
    /// A `publish` was sent.
    Published,
    Failed(ClientError),
}

/// Side effect requested by the machine.
#[derive(Debug, Clone)]
pub enum ExchangeAction {
    Send(String),
    Close(u16),
    /// The exchange is over; hand this outcome to the caller.
    Settle(ExchangeOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Awaiting,
    Settled,
}

#[derive(Debug)]
enum Operation {
    Request,
    Publish { dtype: String, data: Value },
}

/// State machine for one `request` or `publish`.
#[derive(Debug)]
pub struct OneShotExchange {
    channel: String,
    operation: Operation,
    phase: Phase,
}

impl OneShotExchange {
    /// Reads the latest value on `channel`.
    pub fn request(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            operation: Operation::Request,
            phase: Phase::Opening,
        }
    }

    /// Writes `data` tagged `dtype` to `channel` without awaiting a reply.
    pub fn publish(channel: impl Into<String>, dtype: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            operation: Operation::Publish {
                dtype: dtype.into(),
                data,
            },
            phase: Phase::Opening,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Settled
    }

    /// Advances the machine by one connection event.
    pub fn on_event(&mut self, event: ConnectionEvent) -> Vec<ExchangeAction> {
        match (self.phase, event) {
            (Phase::Settled, event) => {
                trace!("channel {}: ignoring {event:?} after settlement", self.channel);
                Vec::new()
            }

            (Phase::Opening, ConnectionEvent::Opened) => self.on_opened(),

            (Phase::Awaiting, ConnectionEvent::MessageReceived(text)) => {
                let outcome = self.interpret_reply(decode(&text));
                self.settle_with_close(outcome)
            }

            (_, ConnectionEvent::Failed(reason)) => self.settle(ExchangeOutcome::Failed(
                ClientError::Connection {
                    channel: self.channel.clone(),
                    reason,
                },
            )),

            (_, ConnectionEvent::Closed(code)) => self.settle(ExchangeOutcome::Failed(
                ClientError::Connection {
                    channel: self.channel.clone(),
                    reason: format!("connection closed with code {code} before a response"),
                },
            )),

            (phase, event) => {
                debug!("channel {}: unexpected {event:?} while {phase:?}", self.channel);
                Vec::new()
            }
        }
    }

    /// Gives up after `after` has elapsed without settlement.
    pub fn on_timeout(&mut self, after: Duration) -> Vec<ExchangeAction> {
        if self.is_settled() {
            return Vec::new();
        }
        let outcome = ExchangeOutcome::Failed(ClientError::Timeout {
            channel: self.channel.clone(),
            after,
        });
        self.settle_with_close(outcome)
    }

    fn on_opened(&mut self) -> Vec<ExchangeAction> {
        match &self.operation {
            Operation::Request => {
                self.phase = Phase::Awaiting;
                vec![ExchangeAction::Send(encode(&Envelope::request(
                    self.channel.as_str(),
                )))]
            }
            Operation::Publish { dtype, data } => {
                let text = encode(&Envelope::publish(
                    self.channel.as_str(),
                    dtype.as_str(),
                    data.clone(),
                ));
                let mut actions = vec![ExchangeAction::Send(text)];
                actions.extend(self.settle_with_close(ExchangeOutcome::Published));
                actions
            }
        }
    }

    fn interpret_reply(&self, decoded: Decoded) -> ExchangeOutcome {
        match decoded {
            Decoded::Valid(envelope) if envelope.kind == MessageKind::Response => {
                ExchangeOutcome::Responded(envelope)
            }
            Decoded::Valid(envelope) if envelope.kind == MessageKind::Error => {
                ExchangeOutcome::Failed(ClientError::Remote {
                    channel: self.channel.clone(),
                    message: envelope.error_text(),
                })
            }
            Decoded::Valid(envelope) => {
                debug!(
                    "channel {}: {} envelope is not a valid reply",
                    self.channel, envelope.kind
                );
                ExchangeOutcome::Failed(self.protocol_error())
            }
            Decoded::Invalid(reason) => {
                debug!("channel {}: undecodable reply: {reason}", self.channel);
                ExchangeOutcome::Failed(self.protocol_error())
            }
        }
    }

    fn protocol_error(&self) -> ClientError {
        ClientError::Protocol {
            channel: self.channel.clone(),
        }
    }

    fn settle(&mut self, outcome: ExchangeOutcome) -> Vec<ExchangeAction> {
        self.phase = Phase::Settled;
        vec![ExchangeAction::Settle(outcome)]
    }

    fn settle_with_close(&mut self, outcome: ExchangeOutcome) -> Vec<ExchangeAction> {
        self.phase = Phase::Settled;
        vec![
            ExchangeAction::Close(NORMAL_CLOSURE),
            ExchangeAction::Settle(outcome),
        ]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn received(text: &str) -> ConnectionEvent {
        ConnectionEvent::MessageReceived(text.to_string())
    }

    fn close_count(actions: &[ExchangeAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, ExchangeAction::Close(_)))
            .count()
    }

    fn outcome(actions: Vec<ExchangeAction>) -> ExchangeOutcome {
        actions
            .into_iter()
            .find_map(|a| match a {
                ExchangeAction::Settle(outcome) => Some(outcome),
                _ => None,
            })
            .expect("actions must settle")
    }

    #[test]
    fn test_request_sends_request_envelope_on_open() {
        // Arrange
        let mut ex = OneShotExchange::request("HOSTNAME");

        // Act
        let actions = ex.on_event(ConnectionEvent::Opened);

        // Assert
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            ExchangeAction::Send(text) => {
                assert_eq!(text, r#"{"type":"request","channel":"HOSTNAME"}"#)
            }
            other => panic!("expected Send, got {other:?}"),
        }
        assert!(!ex.is_settled());
    }

    #[test]
    fn test_request_response_closes_then_settles() {
        let mut ex = OneShotExchange::request("HOSTNAME");
        ex.on_event(ConnectionEvent::Opened);

        let actions = ex.on_event(received(r#"{"type":"response","data":"mbot-01"}"#));

        assert!(matches!(actions[0], ExchangeAction::Close(NORMAL_CLOSURE)));
        match outcome(actions) {
            ExchangeOutcome::Responded(env) => assert_eq!(env.data, Some(json!("mbot-01"))),
            other => panic!("expected Responded, got {other:?}"),
        }
        assert!(ex.is_settled());
    }

    #[test]
    fn test_request_error_reply_is_remote_error_and_closes_once() {
        let mut ex = OneShotExchange::request("LIDAR");
        ex.on_event(ConnectionEvent::Opened);

        let actions = ex.on_event(received(r#"{"type":"error","data":"No data on channel: LIDAR"}"#));
        let mut closes = close_count(&actions);
        let result = outcome(actions);
        closes += close_count(&ex.on_event(ConnectionEvent::Closed(NORMAL_CLOSURE)));

        assert_eq!(closes, 1);
        match result {
            ExchangeOutcome::Failed(ClientError::Remote { channel, message }) => {
                assert_eq!(channel, "LIDAR");
                assert_eq!(message, "No data on channel: LIDAR");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_request_non_reply_kind_is_protocol_error() {
        for text in [
            r#"{"type":"publish","channel":"X","data":1}"#,
            r#"{"type":"subscribe","channel":"X"}"#,
            r#"{"type":"init"}"#,
            r#"{"channel":"X"}"#,
            "garbage",
        ] {
            let mut ex = OneShotExchange::request("X");
            ex.on_event(ConnectionEvent::Opened);
            let result = outcome(ex.on_event(received(text)));
            assert!(
                matches!(result, ExchangeOutcome::Failed(ClientError::Protocol { .. })),
                "expected protocol error for {text}"
            );
        }
    }

    #[test]
    fn test_failure_before_open_is_connection_error_without_close() {
        let mut ex = OneShotExchange::request("HOSTNAME");

        let actions = ex.on_event(ConnectionEvent::Failed("refused".to_string()));

        assert_eq!(close_count(&actions), 0);
        match outcome(actions) {
            ExchangeOutcome::Failed(ClientError::Connection { reason, .. }) => {
                assert_eq!(reason, "refused")
            }
            other => panic!("expected Connection, got {other:?}"),
        }
    }

    #[test]
    fn test_close_before_response_is_connection_error() {
        let mut ex = OneShotExchange::request("HOSTNAME");
        ex.on_event(ConnectionEvent::Opened);

        let result = outcome(ex.on_event(ConnectionEvent::Closed(1006)));

        assert!(matches!(
            result,
            ExchangeOutcome::Failed(ClientError::Connection { .. })
        ));
    }

    #[test]
    fn test_publish_sends_closes_and_settles_on_open() {
        // Arrange
        let mut ex = OneShotExchange::publish("MBOT_VEL_CMD", "twist2D_t", json!({"vx": 0, "vy": 0, "wz": 0}));

        // Act
        let actions = ex.on_event(ConnectionEvent::Opened);

        // Assert: send, close, settle, in that order
        assert_eq!(actions.len(), 3);
        match &actions[0] {
            ExchangeAction::Send(text) => {
                let env = decode(text).into_envelope().unwrap();
                assert_eq!(env.kind, MessageKind::Publish);
                assert_eq!(env.dtype.as_deref(), Some("twist2D_t"));
            }
            other => panic!("expected Send, got {other:?}"),
        }
        assert!(matches!(actions[1], ExchangeAction::Close(NORMAL_CLOSURE)));
        assert!(matches!(
            actions[2],
            ExchangeAction::Settle(ExchangeOutcome::Published)
        ));
    }

    #[test]
    fn test_publish_ignores_replies_after_settlement() {
        let mut ex = OneShotExchange::publish("X", "t", json!(null));
        ex.on_event(ConnectionEvent::Opened);
        assert!(ex.on_event(received(r#"{"type":"error","data":"late"}"#)).is_empty());
        assert!(ex.on_event(ConnectionEvent::Closed(1000)).is_empty());
    }

    #[test]
    fn test_timeout_closes_and_fails() {
        let mut ex = OneShotExchange::request("SLAM_MAP");
        ex.on_event(ConnectionEvent::Opened);

        let actions = ex.on_timeout(Duration::from_millis(50));

        assert_eq!(close_count(&actions), 1);
        assert!(matches!(
            outcome(actions),
            ExchangeOutcome::Failed(ClientError::Timeout { .. })
        ));
        assert!(ex.on_timeout(Duration::from_millis(50)).is_empty());
    }
}
