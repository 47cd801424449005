// autocast-runtime: obs-websocket connection client
//
// Owns the socket, the Hello/Identify handshake and request/response
// correlation. Session logic lives in the `autocast` crate.

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod transport;

pub use auth::auth_response;
pub use client::{ClientOptions, ObsClient};
pub use connection::Connection;
pub use error::{Error, Result};
#[cfg(any(test, feature = "fake"))]
pub use fake::{
    FakeObs, FakeObsBuilder, FakeTransportBuilder, FakeTransportController, RecordedRequest,
};
pub use transport::{
    Dialer, Inbound, Transport, TransportParts, TransportReceiver, WebSocketDialer,
    WebSocketTransport,
};
