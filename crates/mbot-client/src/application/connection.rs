//! Connection port: the seam between the session logic and the transport.
//!
//! A [`Connection`] is the session's view of one WebSocket: a stream of
//! [`ConnectionEvent`]s in and a queue of [`ConnectionCommand`]s out.  The
//! transport holds the other half, a [`ConnectionEndpoint`].
//!
//! ```text
//! session                          transport task
//! ───────                          ──────────────
//! Connection ── Send / Close ────▶ ConnectionEndpoint.commands
//!            ◀─ Opened / Message ─ ConnectionEndpoint.events
//!               Closed / Failed
//! ```
//!
//! # Contract
//!
//! Every connection yields exactly one terminal event (`Closed` or `Failed`)
//! and nothing after it.  [`ConnectionEvents`] enforces this on the receiving
//! side: once a terminal event has been returned, `next_event` yields `None`,
//! and a transport that disappears without a terminal event is reported as
//! `Failed`.

use tokio::sync::mpsc;
use tracing::debug;

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the peer closed without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code reported when the stream ended without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed; the connection can carry frames.
    Opened,
    /// One inbound text frame.
    MessageReceived(String),
    /// The connection closed with the given status code.  Terminal.
    Closed(u16),
    /// The connection could not be opened or broke.  Terminal.
    Failed(String),
}

impl ConnectionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionEvent::Closed(_) | ConnectionEvent::Failed(_))
    }
}

/// Something the session asks the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Send one text frame.
    Send(String),
    /// Start the close handshake with the given status code.
    Close(u16),
}

// ── Session side ──────────────────────────────────────────────────────────────

/// Session-side handle to one connection.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    events: ConnectionEvents,
}

/// Outbound half of a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<ConnectionCommand>,
}

/// Inbound half of a [`Connection`].
#[derive(Debug)]
pub struct ConnectionEvents {
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    terminated: bool,
}

/// Transport-side half of a connection.
///
/// The fields are public so a transport can poll `commands` and push to
/// `events` from separate branches of one `select!`.
#[derive(Debug)]
pub struct ConnectionEndpoint {
    pub commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    pub events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Connection {
    /// Creates a connected session/transport pair.
    pub fn pair() -> (Connection, ConnectionEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            handle: ConnectionHandle {
                commands: command_tx,
            },
            events: ConnectionEvents {
                events: event_rx,
                terminated: false,
            },
        };
        let endpoint = ConnectionEndpoint {
            commands: command_rx,
            events: event_tx,
        };
        (connection, endpoint)
    }

    pub fn send(&self, text: String) {
        self.handle.send(text);
    }

    pub fn close(&self, code: u16) {
        self.handle.close(code);
    }

    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.next_event().await
    }

    /// Splits into independently owned outbound and inbound halves.
    pub fn split(self) -> (ConnectionHandle, ConnectionEvents) {
        (self.handle, self.events)
    }
}

impl ConnectionHandle {
    /// Queues a text frame.  Ignored once the transport is gone; the
    /// terminal event reports why.
    pub fn send(&self, text: String) {
        if self.commands.send(ConnectionCommand::Send(text)).is_err() {
            debug!("send on a finished connection ignored");
        }
    }

    /// Requests the close handshake.
    pub fn close(&self, code: u16) {
        if self.commands.send(ConnectionCommand::Close(code)).is_err() {
            debug!("close on a finished connection ignored");
        }
    }
}

impl ConnectionEvents {
    /// Waits for the next event.
    ///
    /// Returns `None` after the terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        if self.terminated {
            return None;
        }
        let event = match self.events.recv().await {
            Some(event) => event,
            None => ConnectionEvent::Failed("transport ended without closing".to_string()),
        };
        if event.is_terminal() {
            self.terminated = true;
            self.events.close();
        }
        Some(event)
    }
}

impl ConnectionEndpoint {
    /// Pushes an event to the session.  Returns `false` if the session side
    /// has been dropped.
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub async fn next_command(&mut self) -> Option<ConnectionCommand> {
        self.commands.recv().await
    }
}

// ── Connector seam ────────────────────────────────────────────────────────────

/// Opens connections to the bridge server.
///
/// `connect` returns immediately; the handshake result arrives later as
/// `Opened` or `Failed` on the returned connection.  Must be called from
/// within a tokio runtime when the implementation spawns tasks.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Opens a fresh connection dedicated to `channel`.
    fn connect(&self, channel: &str) -> Connection;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
