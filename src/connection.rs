//! Ownership of the single live streaming connection.
//!
//! [`ConnectionManager`] holds at most one connection. Every `connect` starts a new
//! generation and closes whatever the previous generation had open. Inbound frames are
//! decoded on a reader task and delivered, tagged with their generation, on the
//! [`ConnectionEvents`] channel returned by [`ConnectionManager::new`]. That channel
//! exists before any transport opens, so no frame can arrive without a consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{decode_frame, encode_frame};
use crate::credentials::CredentialProvider;
use crate::observability::{
    CONNECT_DURATION, CONNECTION_FAILURES, CONNECTIONS_OPENED, CONNECTIONS_SUPERSEDED,
    FRAMES_DROPPED, FRAMES_RECEIVED, FRAMES_SENT, SEND_FAILURES,
};
use crate::transport::{Connector, Outgoing, TransportEvent};
use crate::{Error, InboundFrame, OutboundFrame, Result};

const DEFAULT_WS_BASE: &str = "ws://localhost:8000/ws/chat/";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the managed connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection was ever requested.
    Idle,
    /// A transport is being opened.
    Connecting,
    /// The transport is open.
    Open,
    /// The last connection was closed.
    Closed,
}

/// An event produced by a connection.
#[derive(Debug)]
pub struct ConnectionEvent {
    /// Generation of the connection that produced the event.
    pub generation: u64,
    /// What happened.
    pub kind: ConnectionEventKind,
}

/// The payload of a [`ConnectionEvent`].
#[derive(Debug)]
pub enum ConnectionEventKind {
    /// A decoded frame.
    Frame(InboundFrame),
    /// The remote end closed the connection.
    Closed {
        /// Close reason, if the remote end gave one.
        reason: Option<String>,
    },
    /// The transport failed.
    Failed(Error),
}

/// The receiving half of a connection manager's event channel.
#[derive(Debug)]
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }
}

/// Configuration for the streaming endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL; the session id is appended as the final path segment.
    pub ws_base: String,

    /// Upper bound on opening a transport.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a ConnectionConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: ws://localhost:8000/ws/chat/
    /// - Connect timeout: 10 seconds
    pub fn new() -> Self {
        Self {
            ws_base: DEFAULT_WS_BASE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the WebSocket base URL.
    pub fn with_ws_base(mut self, ws_base: impl Into<String>) -> Self {
        self.ws_base = ws_base.into();
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the endpoint for a session: `{ws_base}{session_id}?token={token}`.
    ///
    /// The session id is appended as a single percent-encoded path segment.
    pub fn endpoint(&self, session_id: &str, token: &str) -> Result<Url> {
        let mut base = self.ws_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(Error::url(
                format!("streaming endpoint must use ws or wss, got '{}'", base.scheme()),
                None,
            ));
        }
        if matches!(session_id, "" | "." | "..") {
            return Err(Error::url(
                format!("'{session_id}' is not a usable session id"),
                None,
            ));
        }
        let mut url = base;
        url.path_segments_mut()
            .map_err(|_| Error::url("streaming endpoint cannot carry a path", None))?
            .pop_if_empty()
            .push(session_id);
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A claimed connection generation whose transport is not open yet.
#[derive(Debug)]
pub struct ConnectAttempt {
    generation: u64,
    url: Url,
}

impl ConnectAttempt {
    /// The generation this attempt will have once open.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The endpoint being opened.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

struct Slot {
    generation: u64,
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
    reader: Option<JoinHandle<()>>,
}

impl Slot {
    fn shut(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outgoing::Close);
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.state != ConnectionState::Idle {
            self.state = ConnectionState::Closed;
        }
    }
}

/// Owns the single live streaming connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    config: ConnectionConfig,
    slot: Mutex<Slot>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a manager and the channel its connections deliver events on.
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        config: ConnectionConfig,
    ) -> (Self, ConnectionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let this = Self {
            connector,
            credentials,
            config,
            slot: Mutex::new(Slot {
                generation: 0,
                state: ConnectionState::Idle,
                outbound: None,
                reader: None,
            }),
            events,
        };
        (this, ConnectionEvents { rx })
    }

    /// The endpoint configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state of the managed connection.
    pub fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    /// Returns true when a connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Generation of the newest connection attempt.
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Open a connection for `session_id`, closing any previous one first.
    ///
    /// Returns the generation of the new connection. Fails with
    /// [`Error::Authentication`] when no token is available, with
    /// [`Error::Superseded`] when `disconnect` or another `connect` ran while the
    /// transport was opening, and with [`Error::Timeout`] when opening took longer than
    /// the configured connect timeout.
    pub async fn connect(&self, session_id: &str) -> Result<u64> {
        let attempt = self.begin_connect(session_id)?;
        self.finish_connect(attempt).await
    }

    /// The synchronous half of [`ConnectionManager::connect`].
    ///
    /// Closes the previous connection and claims a new generation. Callers that must
    /// order a connect against their own state do this under their own lock and then
    /// await [`ConnectionManager::finish_connect`] without it.
    pub fn begin_connect(&self, session_id: &str) -> Result<ConnectAttempt> {
        let token = self
            .credentials
            .auth_token()
            .ok_or_else(|| Error::authentication("no authentication token available"))?;
        let url = self.config.endpoint(session_id, &token)?;

        let mut slot = self.slot.lock();
        slot.shut();
        slot.generation += 1;
        slot.state = ConnectionState::Connecting;
        debug!(generation = slot.generation, session_id, "opening streaming connection");
        Ok(ConnectAttempt {
            generation: slot.generation,
            url,
        })
    }

    /// Open the transport for an attempt made by [`ConnectionManager::begin_connect`].
    pub async fn finish_connect(&self, attempt: ConnectAttempt) -> Result<u64> {
        let ConnectAttempt { generation, url } = attempt;
        let start = Instant::now();
        let opened =
            tokio::time::timeout(self.config.connect_timeout, self.connector.open(&url)).await;
        let link = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(err)) => {
                self.abandon(generation);
                CONNECTION_FAILURES.click();
                warn!(generation, error = %err, "streaming connection failed to open");
                return Err(err);
            }
            Err(_) => {
                self.abandon(generation);
                CONNECTION_FAILURES.click();
                warn!(generation, "streaming connection timed out while opening");
                return Err(Error::timeout(
                    "timed out opening streaming connection",
                    Some(self.config.connect_timeout.as_secs_f64()),
                ));
            }
        };

        let mut slot = self.slot.lock();
        if slot.generation != generation {
            let _ = link.outbound.send(Outgoing::Close);
            CONNECTIONS_SUPERSEDED.click();
            debug!(generation, "discarding connection superseded while opening");
            return Err(Error::superseded(
                "connection was superseded while opening",
            ));
        }
        let reader = tokio::spawn(forward_inbound(
            generation,
            link.inbound,
            self.events.clone(),
        ));
        slot.outbound = Some(link.outbound);
        slot.reader = Some(reader);
        slot.state = ConnectionState::Open;
        CONNECTIONS_OPENED.click();
        CONNECT_DURATION.add(start.elapsed().as_secs_f64());
        info!(generation, "streaming connection open");
        Ok(generation)
    }

    /// Close the live connection, if any. Idempotent.
    ///
    /// A `connect` still in flight is superseded and its result discarded.
    pub fn disconnect(&self) {
        let mut slot = self.slot.lock();
        match slot.state {
            ConnectionState::Idle | ConnectionState::Closed => {}
            ConnectionState::Connecting | ConnectionState::Open => {
                slot.shut();
                slot.generation += 1;
                info!(generation = slot.generation, "streaming connection closed");
            }
        }
    }

    /// Send a frame on the open connection.
    ///
    /// Fails with [`Error::NotConnected`], without side effects, unless a connection is
    /// open. Nothing is queued for later delivery.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let slot = self.slot.lock();
        let outbound = match (&slot.state, &slot.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            (state, _) => {
                SEND_FAILURES.click();
                return Err(Error::not_connected(format!(
                    "cannot send while connection is {state:?}"
                )));
            }
        };
        let text = encode_frame(frame)?;
        if outbound.send(Outgoing::Text(text)).is_err() {
            SEND_FAILURES.click();
            return Err(Error::connection("transport is no longer writable", None));
        }
        FRAMES_SENT.click();
        Ok(())
    }

    /// Record that the connection of `generation` ended on the remote side.
    ///
    /// Returns true when that connection was the live one.
    pub fn mark_closed(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation || slot.state != ConnectionState::Open {
            return false;
        }
        slot.shut();
        true
    }

    /// Close the connection of `generation` if it is still the live one.
    pub fn close_generation(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return false;
        }
        match slot.state {
            ConnectionState::Idle | ConnectionState::Closed => false,
            ConnectionState::Connecting | ConnectionState::Open => {
                slot.shut();
                slot.generation += 1;
                true
            }
        }
    }

    fn abandon(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.generation == generation {
            slot.state = ConnectionState::Closed;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.slot.get_mut().shut();
    }
}

async fn forward_inbound(
    generation: u64,
    mut inbound: BoxStream<'static, TransportEvent>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(event) = inbound.next().await {
        let kind = match event {
            TransportEvent::Text(text) => match decode_frame(&text) {
                Ok(frame) => {
                    FRAMES_RECEIVED.click();
                    ConnectionEventKind::Frame(frame)
                }
                Err(err) => {
                    FRAMES_DROPPED.click();
                    warn!(generation, error = %err, "dropping undecodable frame");
                    continue;
                }
            },
            TransportEvent::Closed { reason } => {
                let _ = events.send(ConnectionEvent {
                    generation,
                    kind: ConnectionEventKind::Closed { reason },
                });
                return;
            }
            TransportEvent::Failed(err) => {
                let _ = events.send(ConnectionEvent {
                    generation,
                    kind: ConnectionEventKind::Failed(err),
                });
                return;
            }
        };
        if events.send(ConnectionEvent { generation, kind }).is_err() {
            return;
        }
    }
    let _ = events.send(ConnectionEvent {
        generation,
        kind: ConnectionEventKind::Closed { reason: None },
    });
}
