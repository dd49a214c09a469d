//! Message transport between a session and the collaboration server.
//!
//! ```text
//!  SyncSession ── send() ──► outgoing mpsc ──► writer half ──► WebSocket
//!       ▲                                                        │
//!       └──── TransportEvent mpsc ◄──── reader half ◄────────────┘
//! ```
//!
//! The connection task owns the socket and reconnects after a fixed delay
//! until the transport is closed or dropped. Every (re)connection is
//! announced with `Opened`, every loss with `Disconnected`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ProtocolError, SyncMessage};

/// Capacity of the outgoing and event channels.
const CHANNEL_CAPACITY: usize = 256;

/// Something a session can push messages into.
///
/// Sends never block: a message is either handed to the connection task
/// or rejected.
pub trait Transport: Send {
    fn send(&mut self, msg: SyncMessage) -> Result<(), ProtocolError>;

    /// Release the connection. Further sends fail.
    fn close(&mut self);
}

/// Incoming traffic and link changes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Link established (first connect or reconnect)
    Opened,
    /// Decoded message from the server
    Message(SyncMessage),
    /// Link lost; a reconnect attempt follows unless closed
    Disconnected,
}

/// WebSocket transport with automatic reconnect.
pub struct WsTransport {
    outgoing: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
}

impl WsTransport {
    /// Start connecting to `url` in the background.
    ///
    /// Must be called inside a tokio runtime. The event receiver yields
    /// `None` once the connection task has stopped for good.
    pub fn connect(
        url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_connection(
            url.into(),
            reconnect_delay,
            out_rx,
            event_tx,
            shutdown_rx,
        ));

        (
            Self {
                outgoing: out_tx,
                shutdown: shutdown_tx,
            },
            event_rx,
        )
    }
}

impl Transport for WsTransport {
    fn send(&mut self, msg: SyncMessage) -> Result<(), ProtocolError> {
        if *self.shutdown.borrow() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let encoded = msg.encode()?;
        self.outgoing.try_send(encoded).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ProtocolError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }

    fn close(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// How one connected period ended.
enum LinkEnd {
    Lost,
    Shutdown,
}

async fn run_connection(
    url: String,
    reconnect_delay: Duration,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    event_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                log::info!("Connected to {url}");
                if event_tx.send(TransportEvent::Opened).await.is_err() {
                    break;
                }
                let (mut writer, mut reader) = ws_stream.split();

                let end = loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            let _ = writer.send(Message::Close(None)).await;
                            break LinkEnd::Shutdown;
                        }
                        data = out_rx.recv() => {
                            let Some(data) = data else {
                                let _ = writer.send(Message::Close(None)).await;
                                break LinkEnd::Shutdown;
                            };
                            if writer.send(Message::Binary(data.into())).await.is_err() {
                                break LinkEnd::Lost;
                            }
                        }
                        incoming = reader.next() => match incoming {
                            Some(Ok(Message::Binary(data))) => match SyncMessage::decode(&data) {
                                Ok(msg) => {
                                    if event_tx.send(TransportEvent::Message(msg)).await.is_err() {
                                        break LinkEnd::Shutdown;
                                    }
                                }
                                Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                            },
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break LinkEnd::Lost,
                            Some(Ok(_)) => {}
                        },
                    }
                };

                match end {
                    LinkEnd::Shutdown => break,
                    LinkEnd::Lost => {
                        log::warn!("Connection to {url} lost");
                        if event_tx.send(TransportEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => log::warn!("Connecting to {url} failed: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
    log::debug!("Connection task for {url} stopped");
}
