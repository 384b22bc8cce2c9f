//! Session manager: one-shot exchanges and the subscription table.
//!
//! # Structure
//!
//! ```text
//!  Session (cloneable handle)
//!     │  request / publish ──▶ own connection + OneShotExchange, driven inline
//!     │
//!     │  subscribe / unsubscribe / subscriptions / shutdown
//!     ▼
//!  SessionCommand queue ──▶ ┌─────────────── session actor task ───────────────┐
//!                           │ HashMap<wire channel, SubscriptionEntry>         │
//!  TaggedEvent queue ─────▶ │   entry = SubscriptionMachine + connection      │
//!   (one forwarder task     │           + handler + pending waiters            │
//!    per connection)        └──────────────────────────────────────────────────┘
//! ```
//!
//! The actor is the only writer of the subscription table, so no locks are
//! needed.  Every connection is tagged with a unique id; events carrying the
//! id of a connection whose entry has already been removed are dropped.
//!
//! Handlers run on the actor task.  Within one subscription they are invoked
//! in arrival order; a slow handler delays every subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mbot_core::Envelope;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::application::connection::{
    Connection, ConnectionEvent, ConnectionEvents, ConnectionHandle, Connector, NORMAL_CLOSURE,
};
use crate::application::error::ClientError;
use crate::application::exchange::{ExchangeAction, ExchangeOutcome, OneShotExchange};
use crate::application::subscription::{SubscriptionAction, SubscriptionMachine};
use crate::domain::{ClientConfig, SubscriptionState};

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Receives the pushes of one subscription.
///
/// Any `FnMut(Envelope) + Send` closure is a handler; its error path logs a
/// warning.
pub trait SubscriptionHandler: Send + 'static {
    /// Called for every message pushed on the channel, including the first.
    fn on_message(&mut self, envelope: Envelope);

    /// Called when the server reports an error on an active subscription, a
    /// push cannot be decoded, or the connection breaks.
    fn on_error(&mut self, error: ClientError) {
        warn!("subscription error: {error}");
    }
}

impl<F> SubscriptionHandler for F
where
    F: FnMut(Envelope) + Send + 'static,
{
    fn on_message(&mut self, envelope: Envelope) {
        self(envelope)
    }
}

// ── Session handle ────────────────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

enum SessionCommand {
    Subscribe {
        channel: String,
        handler: Box<dyn SubscriptionHandler>,
        reply: Reply<()>,
    },
    Unsubscribe {
        channel: String,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<(String, SubscriptionState)>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a session with one bridge server.
///
/// Cheap to clone; every clone talks to the same subscription table.  When
/// the last clone is dropped the session shuts down as if
/// [`shutdown`](Session::shutdown) had been called.
///
/// Channel names passed to a session are wire names (`MBOT_ODOMETRY`); the
/// [`MBot`](crate::application::robot::MBot) facade translates logical names.
#[derive(Clone)]
pub struct Session {
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    request_timeout: Duration,
}

impl Session {
    /// Starts a session actor that opens connections through `connector`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(connector: Arc<dyn Connector>, config: &ClientConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let actor = SessionActor::new(Arc::clone(&connector), command_rx);
        tokio::spawn(actor.run());

        Self {
            connector,
            commands,
            request_timeout: config.request_timeout,
        }
    }

    /// Reads the latest value on `channel` over a dedicated connection.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Remote`] if the server answers with an error.
    /// - [`ClientError::Protocol`] if the answer is not a response.
    /// - [`ClientError::Connection`] if the connection fails or closes first.
    /// - [`ClientError::Timeout`] if no answer arrives within the request
    ///   timeout.
    pub async fn request(&self, channel: &str) -> Result<Envelope, ClientError> {
        debug!("request on {channel}");
        match self.run_exchange(OneShotExchange::request(channel)).await {
            ExchangeOutcome::Responded(envelope) => Ok(envelope),
            ExchangeOutcome::Failed(error) => Err(error),
            ExchangeOutcome::Published => Err(ClientError::Protocol {
                channel: channel.to_string(),
            }),
        }
    }

    /// Writes `data` to `channel` over a dedicated connection.
    ///
    /// Returns once the envelope has been handed to the transport and the
    /// close requested; no reply is awaited.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connection`] if the connection cannot be opened, or
    /// [`ClientError::Timeout`] if opening takes longer than the request
    /// timeout.
    pub async fn publish(&self, channel: &str, dtype: &str, data: Value) -> Result<(), ClientError> {
        debug!("publish on {channel} ({dtype})");
        match self
            .run_exchange(OneShotExchange::publish(channel, dtype, data))
            .await
        {
            ExchangeOutcome::Published => Ok(()),
            ExchangeOutcome::Failed(error) => Err(error),
            ExchangeOutcome::Responded(_) => Err(ClientError::Protocol {
                channel: channel.to_string(),
            }),
        }
    }

    /// Subscribes `handler` to `channel`.
    ///
    /// Resolves when the first message arrives (which is also delivered to
    /// the handler) or the subscription fails.
    ///
    /// - Already active: returns `Ok(())` at once; `handler` is dropped.
    /// - Still connecting: no new connection; resolves with the outcome of
    ///   the pending subscribe; `handler` is dropped.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidState`] while an unsubscribe is in progress.
    /// - [`ClientError::Remote`], [`ClientError::Protocol`] or
    ///   [`ClientError::Connection`] if the first message is an error, is
    ///   undecodable, or never arrives.
    pub async fn subscribe<H>(&self, channel: &str, handler: H) -> Result<(), ClientError>
    where
        H: SubscriptionHandler,
    {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Subscribe {
            channel: channel.to_string(),
            handler: Box::new(handler),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Ends the subscription on `channel`.
    ///
    /// Resolves once the connection has terminated.  Succeeds immediately
    /// when there is no subscription.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] while the subscription is connecting.
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Unsubscribe {
            channel: channel.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Snapshot of the live subscriptions and their states, sorted by channel.
    pub async fn subscriptions(&self) -> Result<Vec<(String, SubscriptionState)>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(SessionCommand::Snapshot { reply })?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Closes every subscription and stops the actor.
    ///
    /// Pending subscribe and unsubscribe calls fail with
    /// [`ClientError::SessionClosed`].  Calling it twice is harmless.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send_command(SessionCommand::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    fn send_command(&self, command: SessionCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SessionClosed)
    }

    async fn run_exchange(&self, mut exchange: OneShotExchange) -> ExchangeOutcome {
        let mut connection = self.connector.connect(exchange.channel());
        let after = self.request_timeout;

        match timeout(after, drive_exchange(&mut connection, &mut exchange)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("channel {}: no answer within {after:?}", exchange.channel());
                apply_exchange_actions(&connection, exchange.on_timeout(after)).unwrap_or_else(
                    || {
                        ExchangeOutcome::Failed(ClientError::Timeout {
                            channel: exchange.channel().to_string(),
                            after,
                        })
                    },
                )
            }
        }
    }
}

/// Feeds connection events to `exchange` until it settles.
async fn drive_exchange(
    connection: &mut Connection,
    exchange: &mut OneShotExchange,
) -> ExchangeOutcome {
    while let Some(event) = connection.next_event().await {
        trace!("channel {}: {event:?}", exchange.channel());
        if let Some(outcome) = apply_exchange_actions(connection, exchange.on_event(event)) {
            return outcome;
        }
    }
    ExchangeOutcome::Failed(ClientError::Connection {
        channel: exchange.channel().to_string(),
        reason: "connection ended before the exchange settled".to_string(),
    })
}

/// Performs `actions` and returns the settlement outcome, if any.
fn apply_exchange_actions(
    connection: &Connection,
    actions: Vec<ExchangeAction>,
) -> Option<ExchangeOutcome> {
    let mut settled = None;
    for action in actions {
        match action {
            ExchangeAction::Send(text) => connection.send(text),
            ExchangeAction::Close(code) => connection.close(code),
            ExchangeAction::Settle(outcome) => settled = Some(outcome),
        }
    }
    settled
}

// ── Actor ─────────────────────────────────────────────────────────────────────

/// A connection event tagged with the id of the connection it came from.
struct TaggedEvent {
    connection_id: u64,
    event: ConnectionEvent,
}

struct SubscriptionEntry {
    connection_id: u64,
    machine: SubscriptionMachine,
    connection: ConnectionHandle,
    handler: Box<dyn SubscriptionHandler>,
    subscribe_waiters: Vec<Reply<()>>,
    unsubscribe_waiters: Vec<Reply<()>>,
}

impl SubscriptionEntry {
    fn apply(&mut self, actions: Vec<SubscriptionAction>) {
        for action in actions {
            match action {
                SubscriptionAction::Send(text) => self.connection.send(text),
                SubscriptionAction::Close(code) => self.connection.close(code),
                SubscriptionAction::Deliver(envelope) => self.handler.on_message(envelope),
                SubscriptionAction::DeliverError(error) => self.handler.on_error(error),
                SubscriptionAction::SettleSubscribe(result) => {
                    for waiter in self.subscribe_waiters.drain(..) {
                        let _ = waiter.send(result.clone());
                    }
                }
                SubscriptionAction::SettleUnsubscribe => {
                    for waiter in self.unsubscribe_waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                }
            }
        }
    }

    fn fail_waiters(&mut self, error: ClientError) {
        for waiter in self
            .subscribe_waiters
            .drain(..)
            .chain(self.unsubscribe_waiters.drain(..))
        {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

struct SessionActor {
    connector: Arc<dyn Connector>,
    entries: HashMap<String, SubscriptionEntry>,
    next_connection_id: u64,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
}

impl SessionActor {
    fn new(
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            entries: HashMap::new(),
            next_connection_id: 0,
            commands,
            events_tx,
            events_rx,
        }
    }

    async fn run(mut self) {
        debug!("session actor started");
        loop {
            tokio::select! {
                // Commands first, so a burst of subscribe calls is registered
                // before any event of the connection it opened.
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(tagged) = self.events_rx.recv() => self.handle_event(tagged),
            }
        }
        debug!("session actor stopped");
    }

    /// Returns `false` once the actor should stop.
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Subscribe {
                channel,
                handler,
                reply,
            } => self.handle_subscribe(channel, handler, reply),
            SessionCommand::Unsubscribe { channel, reply } => {
                self.handle_unsubscribe(channel, reply)
            }
            SessionCommand::Snapshot { reply } => {
                let mut snapshot: Vec<_> = self
                    .entries
                    .iter()
                    .map(|(channel, entry)| (channel.clone(), entry.machine.state()))
                    .collect();
                snapshot.sort_by(|a, b| a.0.cmp(&b.0));
                let _ = reply.send(snapshot);
            }
            SessionCommand::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_subscribe(
        &mut self,
        channel: String,
        handler: Box<dyn SubscriptionHandler>,
        reply: Reply<()>,
    ) {
        if let Some(entry) = self.entries.get_mut(&channel) {
            match entry.machine.state() {
                SubscriptionState::Connecting => {
                    debug!("{channel}: joining pending subscribe");
                    entry.subscribe_waiters.push(reply);
                }
                SubscriptionState::Active => {
                    debug!("{channel}: already subscribed");
                    let _ = reply.send(Ok(()));
                }
                SubscriptionState::Closing | SubscriptionState::Closed => {
                    let _ = reply.send(Err(ClientError::InvalidState {
                        channel,
                        reason: "cannot subscribe while unsubscribing".to_string(),
                    }));
                }
            }
            return;
        }

        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        let (connection, events) = self.connector.connect(&channel).split();
        self.spawn_forwarder(connection_id, events);

        info!("{channel}: subscribing (connection {connection_id})");
        self.entries.insert(
            channel.clone(),
            SubscriptionEntry {
                connection_id,
                machine: SubscriptionMachine::new(channel),
                connection,
                handler,
                subscribe_waiters: vec![reply],
                unsubscribe_waiters: Vec::new(),
            },
        );
    }

    fn handle_unsubscribe(&mut self, channel: String, reply: Reply<()>) {
        let Some(entry) = self.entries.get_mut(&channel) else {
            debug!("{channel}: unsubscribe without subscription");
            let _ = reply.send(Ok(()));
            return;
        };

        match entry.machine.unsubscribe() {
            Ok(actions) => {
                info!("{channel}: unsubscribing");
                entry.unsubscribe_waiters.push(reply);
                entry.apply(actions);
            }
            Err(error) => {
                let _ = reply.send(Err(error));
            }
        }
    }

    fn handle_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent {
            connection_id,
            event,
        } = tagged;

        let Some(channel) = self
            .entries
            .iter()
            .find(|(_, entry)| entry.connection_id == connection_id)
            .map(|(channel, _)| channel.clone())
        else {
            trace!("dropping {event:?} from stale connection {connection_id}");
            return;
        };

        let Some(entry) = self.entries.get_mut(&channel) else {
            return;
        };
        let actions = entry.machine.on_event(event);
        entry.apply(actions);

        if entry.machine.state() == SubscriptionState::Closed {
            info!("{channel}: subscription ended");
            if let Some(mut entry) = self.entries.remove(&channel) {
                // Anything still waiting was not settled by the machine.
                entry.fail_waiters(ClientError::Connection {
                    channel,
                    reason: "subscription ended".to_string(),
                });
            }
        }
    }

    fn spawn_forwarder(&self, connection_id: u64, mut events: ConnectionEvents) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next_event().await {
                if events_tx
                    .send(TaggedEvent {
                        connection_id,
                        event,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    fn shutdown(&mut self) {
        if !self.entries.is_empty() {
            info!("closing {} subscription(s)", self.entries.len());
        }
        for (_, mut entry) in self.entries.drain() {
            entry.connection.close(NORMAL_CLOSURE);
            entry.fail_waiters(ClientError::SessionClosed);
        }
        self.commands.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
