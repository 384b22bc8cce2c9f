//! WebSocket transport: one tokio task per connection.
//!
//! [`WsConnector::connect`] returns a [`Connection`] immediately and spawns a
//! task that owns the socket for its whole life:
//!
//! 1. Perform the WebSocket handshake with `ws://{host}:{port}`, bounded by
//!    the connect timeout.  Failure or timeout emits `Failed`.
//! 2. Emit `Opened`, split the socket, and pump frames:
//!    - `Send(text)` commands become text frames,
//!    - inbound text frames become `MessageReceived`,
//!    - inbound binary frames are logged and dropped.
//! 3. On `Close(code)`, send a close frame and keep reading (bounded by the
//!    close timeout) until the server acknowledges, then emit `Closed`.
//! 4. If the server closes first, emit `Closed` with its code (1005 when the
//!    frame carries none); if the stream just ends, emit `Closed(1006)`.
//!
//! Exactly one terminal event is emitted per connection.  If the session
//! drops its handle, the socket is closed without emitting anything.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::application::connection::{
    Connection, ConnectionCommand, ConnectionEndpoint, ConnectionEvent, Connector,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE, NO_STATUS_RECEIVED,
};
use crate::domain::ClientConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Settings shared by every connection task.
#[derive(Debug)]
struct Settings {
    uri: String,
    connect_timeout: Duration,
    close_timeout: Duration,
}

/// Opens WebSocket connections to one bridge server.
#[derive(Debug, Clone)]
pub struct WsConnector {
    settings: Arc<Settings>,
}

impl WsConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            settings: Arc::new(Settings {
                uri: config.uri(),
                connect_timeout: config.connect_timeout,
                close_timeout: config.close_timeout,
            }),
        }
    }

    /// The server URI every connection targets.
    pub fn uri(&self) -> &str {
        &self.settings.uri
    }
}

impl Connector for WsConnector {
    fn connect(&self, channel: &str) -> Connection {
        let (connection, endpoint) = Connection::pair();
        let settings = Arc::clone(&self.settings);
        let channel = channel.to_string();

        tokio::spawn(async move {
            run_connection(&settings, &channel, endpoint).await;
        });

        connection
    }
}

// ── Connection task ───────────────────────────────────────────────────────────

async fn run_connection(settings: &Settings, channel: &str, mut endpoint: ConnectionEndpoint) {
    debug!("{channel}: connecting to {}", settings.uri);

    let socket = match timeout(settings.connect_timeout, connect_async(settings.uri.as_str())).await
    {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => {
            warn!("{channel}: cannot connect to {}: {e}", settings.uri);
            endpoint.emit(ConnectionEvent::Failed(e.to_string()));
            return;
        }
        Err(_) => {
            warn!(
                "{channel}: connecting to {} timed out after {:?}",
                settings.uri, settings.connect_timeout
            );
            endpoint.emit(ConnectionEvent::Failed(format!(
                "connect timed out after {:?}",
                settings.connect_timeout
            )));
            return;
        }
    };

    if !endpoint.emit(ConnectionEvent::Opened) {
        debug!("{channel}: session gone before open; closing");
        let (mut sink, mut source) = socket.split();
        close_handshake(&mut sink, &mut source, NORMAL_CLOSURE, settings.close_timeout, None).await;
        return;
    }
    trace!("{channel}: open");

    let (mut sink, mut source) = socket.split();
    let ConnectionEndpoint { commands, events } = &mut endpoint;

    let terminal = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ConnectionCommand::Send(text)) => {
                    trace!("{channel}: → {text}");
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        break ConnectionEvent::Failed(e.to_string());
                    }
                }
                Some(ConnectionCommand::Close(code)) => {
                    debug!("{channel}: closing with {code}");
                    break close_handshake(
                        &mut sink,
                        &mut source,
                        code,
                        settings.close_timeout,
                        Some(&*events),
                    )
                    .await;
                }
                None => {
                    debug!("{channel}: handle dropped; closing quietly");
                    close_handshake(&mut sink, &mut source, NORMAL_CLOSURE, settings.close_timeout, None).await;
                    return;
                }
            },

            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    trace!("{channel}: ← {text}");
                    let _ = events.send(ConnectionEvent::MessageReceived(text));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    warn!("{channel}: dropping {}-byte binary frame", bytes.len());
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    // Flushes the automatic close reply.
                    let _ = sink.close().await;
                    break ConnectionEvent::Closed(close_code(frame.as_ref()));
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    break ConnectionEvent::Closed(ABNORMAL_CLOSURE);
                }
                Some(Err(e)) => break ConnectionEvent::Failed(e.to_string()),
            },
        }
    };

    info!("{channel}: connection ended: {terminal:?}");
    endpoint.emit(terminal);
}

/// Sends a close frame and waits for the server's reply.
///
/// Text frames that arrive meanwhile are still forwarded to `events` when
/// given.  Returns the terminal event to report.
async fn close_handshake(
    sink: &mut WsSink,
    source: &mut WsSource,
    code: u16,
    close_timeout: Duration,
    events: Option<&UnboundedSender<ConnectionEvent>>,
) -> ConnectionEvent {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Borrowed(""),
    };
    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
        debug!("close frame not sent: {e}");
        return ConnectionEvent::Closed(ABNORMAL_CLOSURE);
    }

    let drain = async {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(WsMessage::Close(frame)) => return close_code(frame.as_ref()),
                Ok(WsMessage::Text(text)) => {
                    if let Some(events) = events {
                        let _ = events.send(ConnectionEvent::MessageReceived(text));
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        ABNORMAL_CLOSURE
    };

    match timeout(close_timeout, drain).await {
        Ok(peer_code) => {
            trace!("close acknowledged with {peer_code}");
            ConnectionEvent::Closed(code)
        }
        Err(_) => {
            debug!("server did not acknowledge close within {close_timeout:?}");
            ConnectionEvent::Closed(code)
        }
    }
}

fn close_code(frame: Option<&CloseFrame<'_>>) -> u16 {
    frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
