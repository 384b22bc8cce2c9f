//! Subscription state machine.
//!
//! One [`SubscriptionMachine`] tracks one subscription entry.  Like the
//! one-shot machine it is pure: events and caller requests go in, a list of
//! [`SubscriptionAction`]s comes out, and the session actor performs them.
//!
//! | state      | event / request      | actions                                   | next       |
//! |------------|----------------------|-------------------------------------------|------------|
//! | connecting | opened               | send `subscribe`                          | connecting |
//! | connecting | message (error)      | close, settle subscribe with Remote       | closed     |
//! | connecting | message (invalid)    | close, settle subscribe with Protocol     | closed     |
//! | connecting | message (other)      | deliver, settle subscribe Ok              | active     |
//! | connecting | failed / closed      | settle subscribe with Connection          | closed     |
//! | connecting | unsubscribe          | rejected with InvalidState                | connecting |
//! | active     | message (error)      | deliver error (Remote)                    | active     |
//! | active     | message (invalid)    | deliver error (Protocol)                  | active     |
//! | active     | message (other)      | deliver                                   | active     |
//! | active     | failed               | deliver error (Connection)                | closed     |
//! | active     | closed               |                                           | closed     |
//! | active     | unsubscribe          | close                                     | closing    |
//! | closing    | message              | as for active                             | closing    |
//! | closing    | failed / closed      | settle unsubscribe                        | closed     |
//! | closing    | unsubscribe          | (joins the pending unsubscribe)           | closing    |

use mbot_core::{decode, encode, Decoded, Envelope, MessageKind};
use tracing::{debug, trace};

use crate::application::connection::{ConnectionEvent, NORMAL_CLOSURE};
use crate::application::error::ClientError;
use crate::domain::SubscriptionState;

/// Side effect requested by the machine.
#[derive(Debug, Clone)]
pub enum SubscriptionAction {
    Send(String),
    Close(u16),
    /// Invoke the handler's message path.
    Deliver(Envelope),
    /// Invoke the handler's error path.
    DeliverError(ClientError),
    /// Resolve every pending `subscribe` call with this outcome.
    SettleSubscribe(Result<(), ClientError>),
    /// Resolve every pending `unsubscribe` call successfully.
    SettleUnsubscribe,
}

/// State machine for one subscription entry.
#[derive(Debug)]
pub struct SubscriptionMachine {
    channel: String,
    state: SubscriptionState,
}

impl SubscriptionMachine {
    /// A new entry in the `Connecting` state.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            state: SubscriptionState::Connecting,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Advances the machine by one connection event.
    pub fn on_event(&mut self, event: ConnectionEvent) -> Vec<SubscriptionAction> {
        use SubscriptionState::*;

        match (self.state, event) {
            (Closed, event) => {
                trace!("channel {}: ignoring {event:?} on closed entry", self.channel);
                Vec::new()
            }

            (Connecting, ConnectionEvent::Opened) => {
                vec![SubscriptionAction::Send(encode(&Envelope::subscribe(
                    self.channel.as_str(),
                )))]
            }

            (Connecting, ConnectionEvent::MessageReceived(text)) => self.on_first_message(&text),

            (Active | Closing, ConnectionEvent::MessageReceived(text)) => {
                vec![self.on_push(&text)]
            }

            (Connecting, ConnectionEvent::Failed(reason)) => {
                self.state = Closed;
                vec![SubscriptionAction::SettleSubscribe(Err(self.connection_error(reason)))]
            }

            (Connecting, ConnectionEvent::Closed(code)) => {
                self.state = Closed;
                let reason = format!("connection closed with code {code} before the first message");
                vec![SubscriptionAction::SettleSubscribe(Err(self.connection_error(reason)))]
            }

            (Active, ConnectionEvent::Failed(reason)) => {
                self.state = Closed;
                vec![SubscriptionAction::DeliverError(self.connection_error(reason))]
            }

            (Active, ConnectionEvent::Closed(code)) => {
                debug!("channel {}: server closed the subscription ({code})", self.channel);
                self.state = Closed;
                Vec::new()
            }

            (Closing, ConnectionEvent::Failed(_) | ConnectionEvent::Closed(_)) => {
                self.state = Closed;
                vec![SubscriptionAction::SettleUnsubscribe]
            }

            (state, ConnectionEvent::Opened) => {
                debug!("channel {}: duplicate open while {state}", self.channel);
                Vec::new()
            }
        }
    }

    /// Handles a local unsubscribe request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidState`] while the subscription is still
    /// connecting; the machine is left untouched.
    pub fn unsubscribe(&mut self) -> Result<Vec<SubscriptionAction>, ClientError> {
        match self.state {
            SubscriptionState::Connecting => Err(ClientError::InvalidState {
                channel: self.channel.clone(),
                reason: "cannot unsubscribe while connecting".to_string(),
            }),
            SubscriptionState::Active => {
                self.state = SubscriptionState::Closing;
                Ok(vec![SubscriptionAction::Close(NORMAL_CLOSURE)])
            }
            SubscriptionState::Closing | SubscriptionState::Closed => Ok(Vec::new()),
        }
    }

    fn on_first_message(&mut self, text: &str) -> Vec<SubscriptionAction> {
        match decode(text) {
            Decoded::Valid(envelope) if envelope.kind == MessageKind::Error => {
                self.state = SubscriptionState::Closed;
                let error = self.remote_error(&envelope);
                vec![
                    SubscriptionAction::Close(NORMAL_CLOSURE),
                    SubscriptionAction::SettleSubscribe(Err(error)),
                ]
            }
            Decoded::Valid(envelope) => {
                self.state = SubscriptionState::Active;
                vec![
                    SubscriptionAction::Deliver(envelope),
                    SubscriptionAction::SettleSubscribe(Ok(())),
                ]
            }
            Decoded::Invalid(reason) => {
                debug!("channel {}: undecodable first message: {reason}", self.channel);
                self.state = SubscriptionState::Closed;
                vec![
                    SubscriptionAction::Close(NORMAL_CLOSURE),
                    SubscriptionAction::SettleSubscribe(Err(self.protocol_error())),
                ]
            }
        }
    }

    fn on_push(&self, text: &str) -> SubscriptionAction {
        match decode(text) {
            Decoded::Valid(envelope) if envelope.kind == MessageKind::Error => {
                SubscriptionAction::DeliverError(self.remote_error(&envelope))
            }
            Decoded::Valid(envelope) => SubscriptionAction::Deliver(envelope),
            Decoded::Invalid(reason) => {
                debug!("channel {}: undecodable push: {reason}", self.channel);
                SubscriptionAction::DeliverError(self.protocol_error())
            }
        }
    }

    fn remote_error(&self, envelope: &Envelope) -> ClientError {
        ClientError::Remote {
            channel: self.channel.clone(),
            message: envelope.error_text(),
        }
    }

    fn protocol_error(&self) -> ClientError {
        ClientError::Protocol {
            channel: self.channel.clone(),
        }
    }

    fn connection_error(&self, reason: String) -> ClientError {
        ClientError::Connection {
            channel: self.channel.clone(),
            reason,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ODOMETRY_PUSH: &str =
        r#"{"type":"publish","channel":"MBOT_ODOMETRY","data":{"x":1,"y":2,"theta":0.5}}"#;

    fn received(text: &str) -> ConnectionEvent {
        ConnectionEvent::MessageReceived(text.to_string())
    }

    fn active_machine() -> SubscriptionMachine {
        let mut m = SubscriptionMachine::new("MBOT_ODOMETRY");
        m.on_event(ConnectionEvent::Opened);
        m.on_event(received(ODOMETRY_PUSH));
        assert_eq!(m.state(), SubscriptionState::Active);
        m
    }

    #[test]
    fn test_open_sends_subscribe_envelope() {
        // Arrange
        let mut m = SubscriptionMachine::new("MBOT_ODOMETRY");

        // Act
        let actions = m.on_event(ConnectionEvent::Opened);

        // Assert
        match actions.as_slice() {
            [SubscriptionAction::Send(text)] => {
                assert_eq!(text, r#"{"type":"subscribe","channel":"MBOT_ODOMETRY"}"#)
            }
            other => panic!("unexpected actions {other:?}"),
        }
        assert_eq!(m.state(), SubscriptionState::Connecting);
    }

    #[test]
    fn test_first_message_delivers_then_settles_ok() {
        let mut m = SubscriptionMachine::new("MBOT_ODOMETRY");
        m.on_event(ConnectionEvent::Opened);

        let actions = m.on_event(received(ODOMETRY_PUSH));

        match actions.as_slice() {
            [SubscriptionAction::Deliver(env), SubscriptionAction::SettleSubscribe(Ok(()))] => {
                assert_eq!(env.data, Some(json!({"x": 1, "y": 2, "theta": 0.5})));
            }
            other => panic!("unexpected actions {other:?}"),
        }
        assert_eq!(m.state(), SubscriptionState::Active);
    }

    #[test]
    fn test_second_message_only_delivers() {
        let mut m = active_machine();

        let actions = m.on_event(received(ODOMETRY_PUSH));

        assert!(matches!(actions.as_slice(), [SubscriptionAction::Deliver(_)]));
    }

    #[test]
    fn test_first_message_error_fails_and_closes() {
        let mut m = SubscriptionMachine::new("FOO");
        m.on_event(ConnectionEvent::Opened);

        let actions = m.on_event(received(r#"{"type":"error","data":"Bad MBot request. No channel: FOO"}"#));

        match actions.as_slice() {
            [SubscriptionAction::Close(NORMAL_CLOSURE), SubscriptionAction::SettleSubscribe(Err(ClientError::Remote { message, .. }))] => {
                assert_eq!(message, "Bad MBot request. No channel: FOO")
            }
            other => panic!("unexpected actions {other:?}"),
        }
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_first_message_invalid_fails_with_protocol_error() {
        let mut m = SubscriptionMachine::new("LIDAR");
        m.on_event(ConnectionEvent::Opened);

        let actions = m.on_event(received("{oops"));

        assert!(matches!(
            actions.as_slice(),
            [
                SubscriptionAction::Close(_),
                SubscriptionAction::SettleSubscribe(Err(ClientError::Protocol { .. }))
            ]
        ));
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_error_while_active_goes_to_error_path() {
        let mut m = active_machine();

        let actions = m.on_event(received(r#"{"type":"error","data":"stale"}"#));

        assert!(matches!(
            actions.as_slice(),
            [SubscriptionAction::DeliverError(ClientError::Remote { .. })]
        ));
        assert_eq!(m.state(), SubscriptionState::Active);
    }

    #[test]
    fn test_invalid_while_active_goes_to_error_path() {
        let mut m = active_machine();
        let actions = m.on_event(received(r#"{"type":"nope"}"#));
        assert!(matches!(
            actions.as_slice(),
            [SubscriptionAction::DeliverError(ClientError::Protocol { .. })]
        ));
    }

    #[test]
    fn test_failure_while_connecting_settles_with_connection_error() {
        let mut m = SubscriptionMachine::new("LIDAR");
        let actions = m.on_event(ConnectionEvent::Failed("refused".to_string()));
        assert!(matches!(
            actions.as_slice(),
            [SubscriptionAction::SettleSubscribe(Err(ClientError::Connection { .. }))]
        ));
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_close_while_connecting_settles_with_connection_error() {
        let mut m = SubscriptionMachine::new("LIDAR");
        m.on_event(ConnectionEvent::Opened);
        let actions = m.on_event(ConnectionEvent::Closed(1006));
        assert!(matches!(
            actions.as_slice(),
            [SubscriptionAction::SettleSubscribe(Err(ClientError::Connection { .. }))]
        ));
    }

    #[test]
    fn test_failure_while_active_reaches_handler() {
        let mut m = active_machine();
        let actions = m.on_event(ConnectionEvent::Failed("reset".to_string()));
        assert!(matches!(
            actions.as_slice(),
            [SubscriptionAction::DeliverError(ClientError::Connection { .. })]
        ));
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_server_close_while_active_just_closes() {
        let mut m = active_machine();
        assert!(m.on_event(ConnectionEvent::Closed(1001)).is_empty());
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_unsubscribe_while_connecting_is_rejected_and_untouched() {
        let mut m = SubscriptionMachine::new("LIDAR");

        let result = m.unsubscribe();

        match result {
            Err(ClientError::InvalidState { reason, .. }) => {
                assert_eq!(reason, "cannot unsubscribe while connecting")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.state(), SubscriptionState::Connecting);
    }

    #[test]
    fn test_unsubscribe_while_active_closes_then_settles_on_terminal_event() {
        // Arrange
        let mut m = active_machine();

        // Act
        let actions = m.unsubscribe().unwrap();

        // Assert
        assert!(matches!(actions.as_slice(), [SubscriptionAction::Close(NORMAL_CLOSURE)]));
        assert_eq!(m.state(), SubscriptionState::Closing);

        // A second unsubscribe joins the first without another close.
        assert!(m.unsubscribe().unwrap().is_empty());

        // Pushes still reach the handler while closing.
        assert!(matches!(
            m.on_event(received(ODOMETRY_PUSH)).as_slice(),
            [SubscriptionAction::Deliver(_)]
        ));

        let actions = m.on_event(ConnectionEvent::Closed(NORMAL_CLOSURE));
        assert!(matches!(actions.as_slice(), [SubscriptionAction::SettleUnsubscribe]));
        assert_eq!(m.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_failure_while_closing_still_settles_unsubscribe() {
        let mut m = active_machine();
        m.unsubscribe().unwrap();
        let actions = m.on_event(ConnectionEvent::Failed("reset".to_string()));
        assert!(matches!(actions.as_slice(), [SubscriptionAction::SettleUnsubscribe]));
    }

    #[test]
    fn test_events_after_closed_are_ignored() {
        let mut m = active_machine();
        m.on_event(ConnectionEvent::Closed(1000));
        assert!(m.on_event(received(ODOMETRY_PUSH)).is_empty());
        assert!(m.on_event(ConnectionEvent::Failed("x".to_string())).is_empty());
    }
}
