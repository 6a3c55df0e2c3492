//! The streaming transport seam.
//!
//! A [`Connector`] opens a bidirectional text channel for a URL. The connection
//! manager only ever sees a [`TransportLink`]: an outbound queue and an ordered stream
//! of inbound [`TransportEvent`]s. [`WebSocketConnector`] is the production
//! implementation; [`MemoryConnector`](crate::memory::MemoryConnector) runs in-process.

use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

use crate::{Error, Result};

/// Something the connection manager asks the transport to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A text frame.
    Text(String),
    /// Close the transport.
    Close,
}

/// Something the transport observed.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame arrived.
    Text(String),
    /// The remote end closed the transport.
    Closed {
        /// Close reason supplied by the remote end, if any.
        reason: Option<String>,
    },
    /// The transport failed.
    Failed(Error),
}

/// An open transport.
pub struct TransportLink {
    /// Frames queued here are written in order. Dropping the sender closes the transport.
    pub outbound: mpsc::UnboundedSender<Outgoing>,
    /// Inbound events in arrival order.
    pub inbound: BoxStream<'static, TransportEvent>,
}

/// Opens transports.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`, resolving once it is usable in both directions.
    async fn open(&self, url: &Url) -> Result<TransportLink>;
}

/// Opens WebSocket transports with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a WebSocket connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        let (socket, _response) = connect_async(url.as_str()).await.map_err(|e| {
            Error::connection(
                format!("WebSocket handshake failed: {e}"),
                Some(Box::new(e)),
            )
        })?;
        let (mut sink, stream) = socket.split();

        let (outbound, mut queue) = mpsc::unbounded_channel::<Outgoing>();
        tokio::spawn(async move {
            while let Some(outgoing) = queue.recv().await {
                match outgoing {
                    Outgoing::Text(text) => {
                        if let Err(err) = sink.send(WsMessage::Text(text)).await {
                            warn!(error = %err, "WebSocket write failed");
                            return;
                        }
                    }
                    Outgoing::Close => break,
                }
            }
            if let Err(err) = sink.close().await {
                debug!(error = %err, "WebSocket close failed");
            }
        });

        let inbound = stream
            .filter_map(|item| async move {
                match item {
                    Ok(WsMessage::Text(text)) => Some(TransportEvent::Text(text.to_string())),
                    Ok(WsMessage::Close(frame)) => Some(TransportEvent::Closed {
                        reason: frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty()),
                    }),
                    Ok(_) => None,
                    Err(err) => Some(TransportEvent::Failed(Error::connection(
                        format!("WebSocket read failed: {err}"),
                        Some(Box::new(err)),
                    ))),
                }
            })
            .boxed();

        Ok(TransportLink { outbound, inbound })
    }
}
