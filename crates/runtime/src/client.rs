//! Client session with an obs-websocket server.
//!
//! ```ignore
//! let options = ClientOptions::default();
//! let mut client = ObsClient::connect(&WebSocketDialer, "ws://localhost:4455", options).await?;
//! client.authenticate(Some("secret")).await?;
//! let version: VersionInfo = client.request(request::GET_VERSION, None).await?;
//! client.disconnect().await;
//! ```
//!
//! The lifecycle is `connect` (socket open, `Hello` received), then
//! `authenticate` (`Identify` sent, `Identified` received), after which
//! commands may be sent. [`ObsClient::disconnect`] may be called in any phase
//! and any number of times.

use std::sync::Arc;
use std::time::Duration;

use autocast_protocol::{
    Envelope, Event, Hello, Identify, OpCode, RPC_VERSION, ServerMessage, close, subscription,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace};

use crate::auth::auth_response;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::{Dialer, Inbound, TransportParts};

/// Timeouts and event interests of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bound on each handshake step (`Hello`, then `Identified`).
    pub handshake_timeout: Duration,
    /// Bound on each request's round trip.
    pub request_timeout: Duration,
    /// Bit mask from [`subscription`].
    pub event_subscriptions: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            event_subscriptions: subscription::GENERAL
                | subscription::SCENES
                | subscription::OUTPUTS,
        }
    }
}

impl ClientOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Greeted,
    Identified,
    Disconnected,
}

pub struct ObsClient {
    url: String,
    hello: Hello,
    options: ClientOptions,
    phase: Phase,
    connection: Arc<Connection>,
    /// Inbound frames, held here until the dispatch loop takes over.
    handshake_rx: Option<mpsc::UnboundedReceiver<Inbound>>,
    reader: JoinHandle<()>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ObsClient {
    /// Opens the transport and waits for the server's `Hello`.
    ///
    /// Fails with [`Error::Unreachable`] when nothing answers at `url` and
    /// with [`Error::ProtocolMismatch`] when the peer does not greet like an
    /// obs-websocket v5 server.
    pub async fn connect(dialer: &dyn Dialer, url: &str, options: ClientOptions) -> Result<Self> {
        debug!(target: "autocast.client", %url, "connecting");
        let TransportParts {
            sender,
            receiver,
            mut message_rx,
        } = dialer.dial(url).await?;

        let reader = tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                debug!(
                    target: "autocast.client",
                    error = %e,
                    "transport read loop ended with error"
                );
            }
        });
        let connection = Arc::new(Connection::new(sender, options.request_timeout));

        let deadline = Instant::now() + options.handshake_timeout;
        let hello = match timeout_at(deadline, message_rx.recv()).await {
            Err(_) => Err(Error::ProtocolMismatch(format!(
                "server sent no Hello within {:?}",
                options.handshake_timeout
            ))),
            Ok(None) => Err(Error::ConnectionClosed {
                code: None,
                reason: "transport ended before Hello".to_string(),
            }),
            Ok(Some(Inbound::Closed { code, reason })) => {
                Err(Error::ConnectionClosed { code, reason })
            }
            Ok(Some(Inbound::Message(value))) => match ServerMessage::from_value(value) {
                Ok(ServerMessage::Hello(hello)) if hello.rpc_version >= RPC_VERSION => Ok(hello),
                Ok(ServerMessage::Hello(hello)) => Err(Error::ProtocolMismatch(format!(
                    "server offers rpc version {}, client needs {RPC_VERSION}",
                    hello.rpc_version
                ))),
                Ok(other) => Err(Error::ProtocolMismatch(format!("expected Hello, got {other:?}"))),
                Err(e) => Err(Error::ProtocolMismatch(format!("undecodable greeting: {e}"))),
            },
        };

        let hello = match hello {
            Ok(hello) => hello,
            Err(e) => {
                let _ = connection.close().await;
                reader.abort();
                return Err(e);
            }
        };

        info!(
            target: "autocast.client",
            %url,
            server_version = %hello.obs_web_socket_version,
            rpc_version = hello.rpc_version,
            auth_required = hello.authentication.is_some(),
            "connected"
        );

        Ok(Self {
            url: url.to_string(),
            hello,
            options,
            phase: Phase::Greeted,
            connection,
            handshake_rx: Some(message_rx),
            reader,
            dispatcher: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The server's greeting.
    pub fn hello(&self) -> &Hello {
        &self.hello
    }

    pub fn requires_auth(&self) -> bool {
        self.hello.authentication.is_some()
    }

    pub fn is_identified(&self) -> bool {
        self.phase == Phase::Identified
    }

    /// Completes the handshake.
    ///
    /// When the server advertised a challenge, `password` is required and a
    /// wrong one fails with [`Error::AuthenticationFailed`]. When it did not,
    /// any password is ignored. Calling this again after success is a no-op.
    pub async fn authenticate(&mut self, password: Option<&str>) -> Result<()> {
        match self.phase {
            Phase::Identified => return Ok(()),
            Phase::Disconnected => return Err(Error::Disconnected),
            Phase::Greeted => {}
        }

        let authentication = match (&self.hello.authentication, password) {
            (Some(challenge), Some(password)) => Some(auth_response(password, challenge)),
            (Some(_), None) => return Err(Error::PasswordRequired),
            (None, Some(_)) => {
                debug!(
                    target: "autocast.client",
                    "server does not require authentication; ignoring password"
                );
                None
            }
            (None, None) => None,
        };

        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: Some(self.options.event_subscriptions),
        };
        self.connection.send_envelope(&Envelope::new(OpCode::Identify, &identify)?).await?;

        let message_rx = self.handshake_rx.as_mut().ok_or(Error::Disconnected)?;
        let deadline = Instant::now() + self.options.handshake_timeout;
        let identified = loop {
            let inbound = match timeout_at(deadline, message_rx.recv()).await {
                Ok(inbound) => inbound,
                Err(_) => return Err(Error::Timeout("Identified".to_string())),
            };
            match inbound {
                None => {
                    return Err(Error::ConnectionClosed {
                        code: None,
                        reason: "transport ended during handshake".to_string(),
                    });
                }
                Some(Inbound::Closed { code: Some(close::AUTHENTICATION_FAILED), reason }) => {
                    return Err(Error::AuthenticationFailed(if reason.is_empty() {
                        "server rejected the password".to_string()
                    } else {
                        reason
                    }));
                }
                Some(Inbound::Closed { code: Some(close::UNSUPPORTED_RPC_VERSION), reason }) => {
                    return Err(Error::ProtocolMismatch(reason));
                }
                Some(Inbound::Closed { code, reason }) => {
                    return Err(Error::ConnectionClosed { code, reason });
                }
                Some(Inbound::Message(value)) => match ServerMessage::from_value(value)? {
                    ServerMessage::Identified(identified) => break identified,
                    other => {
                        trace!(target: "autocast.client", ?other, "ignoring frame during handshake")
                    }
                },
            }
        };

        let message_rx = self.handshake_rx.take().ok_or(Error::Disconnected)?;
        let connection = Arc::clone(&self.connection);
        self.dispatcher = Some(tokio::spawn(async move { connection.run(message_rx).await }));
        self.phase = Phase::Identified;

        info!(
            target: "autocast.client",
            url = %self.url,
            negotiated_rpc_version = identified.negotiated_rpc_version,
            "identified"
        );
        Ok(())
    }

    /// Sends one command and returns its `responseData` (or `null`).
    pub async fn send_command(&self, request_type: &str, data: Option<Value>) -> Result<Value> {
        match self.phase {
            Phase::Greeted => Err(Error::NotIdentified),
            Phase::Disconnected => Err(Error::Disconnected),
            Phase::Identified => {
                let result = self.connection.send_request(request_type, data).await;
                match &result {
                    Ok(_) => trace!(target: "autocast.client", %request_type, "command ok"),
                    Err(e) => debug!(
                        target: "autocast.client",
                        %request_type,
                        error = %e,
                        "command failed"
                    ),
                }
                result
            }
        }
    }

    /// Like [`send_command`](Self::send_command), decoding the response data.
    pub async fn request<T: DeserializeOwned>(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<T> {
        let value = self.send_command(request_type, data).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Events received after identification.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.connection.subscribe()
    }

    /// Closes the session. Never fails; a second call does nothing.
    pub async fn disconnect(&mut self) {
        if self.phase == Phase::Disconnected {
            return;
        }
        self.phase = Phase::Disconnected;

        if let Err(e) = self.connection.close().await {
            debug!(target: "autocast.client", error = %e, "error while closing transport");
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
        self.handshake_rx = None;
        self.reader.abort();
        info!(target: "autocast.client", url = %self.url, "disconnected");
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
        self.reader.abort();
    }
}

impl std::fmt::Debug for ObsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsClient")
            .field("url", &self.url)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
