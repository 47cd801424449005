//! Transport layer between the connection and the broadcast application.
//!
//! A transport is split into a sending half ([`Transport`]) and a read loop
//! ([`TransportReceiver`]) that forwards every inbound frame onto an unbounded
//! channel. The split lets the connection own the writer while the reader runs
//! in its own task, and lets tests swap the WebSocket for an in-memory pair
//! (see [`crate::fake`]).

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Item delivered by a transport's read loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A decoded JSON text frame.
    Message(JsonValue),
    /// The peer closed the socket, or the read loop failed.
    Closed { code: Option<u16>, reason: String },
}

/// Sending half of a transport.
pub trait Transport: Send {
    fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Initiates a graceful close. Calling it twice is harmless.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Read loop of a transport; runs until the peer closes or the channel is dropped.
pub trait TransportReceiver: Send {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// A connected transport, ready to hand to a connection.
pub struct TransportParts {
    pub sender: Box<dyn Transport>,
    pub receiver: Box<dyn TransportReceiver>,
    pub message_rx: mpsc::UnboundedReceiver<Inbound>,
}

/// Opens transports for a control endpoint URL.
///
/// The client depends on this seam rather than on WebSocket directly so a
/// session can be driven against `FakeObs` (feature `fake`).
pub trait Dialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>>;
}

/// Dials real `ws://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    fn dial<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
        Box::pin(async move {
            let (transport, message_rx) = WebSocketTransport::connect(url).await?;
            Ok(transport.into_transport_parts(message_rx))
        })
    }
}

/// JSON-over-WebSocket transport.
pub struct WebSocketTransport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    message_tx: mpsc::UnboundedSender<Inbound>,
}

impl WebSocketTransport {
    /// Connects to `url` and returns the transport plus its inbound channel.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>)> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Unreachable {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        debug!(target: "autocast.transport", %url, "websocket connected");

        let (sink, stream) = ws.split();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        Ok((Self { sink, stream, message_tx }, message_rx))
    }

    pub fn into_transport_parts(
        self,
        message_rx: mpsc::UnboundedReceiver<Inbound>,
    ) -> TransportParts {
        TransportParts {
            sender: Box::new(WebSocketSender { sink: self.sink, closed: false }),
            receiver: Box::new(WebSocketReceiver {
                stream: self.stream,
                message_tx: self.message_tx,
            }),
            message_rx,
        }
    }
}

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

impl Transport for WebSocketSender {
    fn send(
        &mut self,
        message: JsonValue,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Err(Error::Disconnected);
            }
            self.sink.send(Message::Text(message.to_string())).await?;
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if std::mem::replace(&mut self.closed, true) {
                return Ok(());
            }
            self.sink.close().await?;
            Ok(())
        })
    }
}

struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
    message_tx: mpsc::UnboundedSender<Inbound>,
}

impl TransportReceiver for WebSocketReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<JsonValue>(&text) {
                        Ok(value) => {
                            if self.message_tx.send(Inbound::Message(value)).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!(
                            target: "autocast.transport",
                            error = %e,
                            "dropping undecodable frame"
                        ),
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((None, String::new()));
                        debug!(
                            target: "autocast.transport",
                            ?code,
                            %reason,
                            "peer closed websocket"
                        );
                        let _ = self.message_tx.send(Inbound::Closed { code, reason });
                        return Ok(());
                    }
                    // tungstenite answers pings itself; binary means msgpack, never negotiated
                    Ok(_) => {}
                    Err(e) => {
                        let _ = self.message_tx.send(Inbound::Closed {
                            code: None,
                            reason: e.to_string(),
                        });
                        return Err(e.into());
                    }
                }
            }

            let _ = self.message_tx.send(Inbound::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
            Ok(())
        })
    }
}
