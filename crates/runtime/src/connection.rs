//! Request/response correlation on top of a transport.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_request`] with a request type and data
//! 2. Connection allocates a unique `requestId` and parks a oneshot sender under it
//! 3. The `Request` frame (op 6) is written through the transport
//! 4. [`Connection::run`] reads inbound frames and completes the matching oneshot
//!    when the `RequestResponse` (op 7) arrives
//! 5. Events (op 5) are fanned out on a broadcast channel
//!
//! When the transport reports a close, every parked request fails with
//! [`Error::ConnectionClosed`] and later sends fail fast.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use autocast_protocol::{Envelope, Event, OpCode, Request, RequestResponse, ServerMessage};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Inbound, Transport};

const EVENT_CAPACITY: usize = 64;

type Callbacks = HashMap<String, oneshot::Sender<Result<Value>>>;

/// Close code and reason recorded when the transport went away.
type CloseInfo = (Option<u16>, String);

pub struct Connection {
    /// Sequential request ID counter
    last_id: AtomicU64,
    /// Pending request callbacks keyed by request ID
    callbacks: Arc<Mutex<Callbacks>>,
    sender: Mutex<Box<dyn Transport>>,
    events: broadcast::Sender<Event>,
    closed: parking_lot::Mutex<Option<CloseInfo>>,
    request_timeout: Duration,
}

impl Connection {
    pub fn new(sender: Box<dyn Transport>, request_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            last_id: AtomicU64::new(1),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            sender: Mutex::new(sender),
            events,
            closed: parking_lot::Mutex::new(None),
            request_timeout,
        }
    }

    /// Writes a raw frame; used for the handshake before requests are allowed.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let value = serde_json::to_value(envelope)?;
        self.sender.lock().await.send(value).await
    }

    /// Sends a request and awaits its correlated response data.
    ///
    /// Fails with [`Error::RequestFailed`] when the server reports
    /// `result: false`, and with [`Error::Timeout`] when no response arrives
    /// within the request timeout.
    pub async fn send_request(&self, request_type: &str, data: Option<Value>) -> Result<Value> {
        let request_id = self.last_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut callbacks = self.callbacks.lock().await;
            if let Some((code, reason)) = self.closed.lock().clone() {
                return Err(Error::ConnectionClosed { code, reason });
            }
            callbacks.insert(request_id.clone(), tx);
        }

        let request = Request {
            request_type: request_type.to_string(),
            request_id: request_id.clone(),
            request_data: data,
        };
        trace!(target: "autocast.connection", %request_type, %request_id, "sending request");

        let sent = match Envelope::new(OpCode::Request, &request) {
            Ok(envelope) => self.send_envelope(&envelope).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.callbacks.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(reply) => reply.map_err(|_| Error::ChannelClosed).and_then(|result| result),
            Err(_) => {
                self.callbacks.lock().await.remove(&request_id);
                Err(Error::Timeout(format!("{request_type} response")))
            }
        }
    }

    /// Subscribes to server events. Slow subscribers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().is_some()
    }

    /// Closes the underlying transport.
    pub async fn close(&self) -> Result<()> {
        self.sender.lock().await.close().await
    }

    /// Runs the dispatch loop until the transport closes.
    pub async fn run(&self, mut message_rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(inbound) = message_rx.recv().await {
            match inbound {
                Inbound::Message(value) => match ServerMessage::from_value(value.clone()) {
                    Ok(message) => {
                        if let Err(e) = self.dispatch(message).await {
                            warn!(
                                target: "autocast.connection",
                                error = %e,
                                "error dispatching message"
                            );
                        }
                    }
                    Err(e) => warn!(
                        target: "autocast.connection",
                        error = %e,
                        message = %value,
                        "failed to parse message"
                    ),
                },
                Inbound::Closed { code, reason } => {
                    debug!(target: "autocast.connection", ?code, %reason, "transport closed");
                    self.fail_pending(code, reason).await;
                    return;
                }
            }
        }

        self.fail_pending(None, "transport ended".to_string()).await;
    }

    async fn dispatch(&self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::RequestResponse(response) => self.complete(response).await,
            ServerMessage::Event(event) => {
                trace!(target: "autocast.connection", event_type = %event.event_type, "event");
                // no subscribers is fine
                let _ = self.events.send(event);
                Ok(())
            }
            ServerMessage::Hello(_) | ServerMessage::Identified(_) => Err(Error::ProtocolMismatch(
                "handshake frame after identification".to_string(),
            )),
            ServerMessage::Unexpected(op) => {
                debug!(target: "autocast.connection", ?op, "ignoring unexpected frame");
                Ok(())
            }
        }
    }

    async fn complete(&self, response: RequestResponse) -> Result<()> {
        let callback = self
            .callbacks
            .lock()
            .await
            .remove(&response.request_id)
            .ok_or_else(|| {
                Error::ProtocolMismatch(format!(
                    "response for unknown request id {}",
                    response.request_id
                ))
            })?;

        let result = if response.request_status.result {
            Ok(response.response_data.unwrap_or(Value::Null))
        } else {
            Err(Error::RequestFailed {
                request_type: response.request_type,
                code: response.request_status.code,
                comment: response.request_status.comment,
            })
        };

        // receiver may have timed out already
        let _ = callback.send(result);
        Ok(())
    }

    async fn fail_pending(&self, code: Option<u16>, reason: String) {
        let mut callbacks = self.callbacks.lock().await;
        *self.closed.lock() = Some((code, reason.clone()));
        for (_, callback) in callbacks.drain() {
            let _ = callback.send(Err(Error::ConnectionClosed {
                code,
                reason: reason.clone(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeTransportBuilder, FakeTransportController};
    use autocast_protocol::RequestStatus;
    use serde_json::json;

    fn spawn_connection() -> (Arc<Connection>, FakeTransportController) {
        let (parts, controller) = FakeTransportBuilder::new().build();
        let connection = Arc::new(Connection::new(parts.sender, Duration::from_secs(5)));

        tokio::spawn(parts.receiver.run());
        let conn = Arc::clone(&connection);
        let message_rx = parts.message_rx;
        tokio::spawn(async move { conn.run(message_rx).await });

        (connection, controller)
    }

    fn response(request_id: &str, result: bool, code: u16) -> ServerMessage {
        ServerMessage::RequestResponse(RequestResponse {
            request_type: "GetVersion".into(),
            request_id: request_id.into(),
            request_status: RequestStatus {
                result,
                code,
                comment: (!result).then(|| "nope".to_string()),
            },
            response_data: result.then(|| json!({"obsVersion": "30.1.2"})),
        })
    }

    #[test]
    fn request_ids_increment() {
        let (parts, _controller) = FakeTransportBuilder::new().build();
        let connection = Connection::new(parts.sender, Duration::from_secs(1));

        let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
        let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
        assert_eq!(id2, id1 + 1);
    }

    #[tokio::test]
    async fn dispatch_response_success() {
        let (parts, _controller) = FakeTransportBuilder::new().build();
        let connection = Connection::new(parts.sender, Duration::from_secs(1));

        let (tx, rx) = oneshot::channel();
        connection.callbacks.lock().await.insert("7".into(), tx);
        connection.dispatch(response("7", true, 100)).await.unwrap();

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result["obsVersion"], "30.1.2");
    }

    #[tokio::test]
    async fn dispatch_response_failure_carries_status() {
        let (parts, _controller) = FakeTransportBuilder::new().build();
        let connection = Connection::new(parts.sender, Duration::from_secs(1));

        let (tx, rx) = oneshot::channel();
        connection.callbacks.lock().await.insert("8".into(), tx);
        connection.dispatch(response("8", false, 600)).await.unwrap();

        match rx.await.unwrap() {
            Err(Error::RequestFailed { code, comment, .. }) => {
                assert_eq!(code, 600);
                assert_eq!(comment.as_deref(), Some("nope"));
            }
            other => panic!("Expected RequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_unknown_id_is_an_error() {
        let (parts, _controller) = FakeTransportBuilder::new().build();
        let connection = Connection::new(parts.sender, Duration::from_secs(1));

        let result = connection.dispatch(response("999", true, 100)).await;
        match result {
            Err(Error::ProtocolMismatch(msg)) => assert!(msg.contains("unknown request id")),
            other => panic!("Expected ProtocolMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn responses_out_of_order_reach_their_callers() {
        let (connection, controller) = spawn_connection();

        let conn1 = Arc::clone(&connection);
        let conn2 = Arc::clone(&connection);
        let first = tokio::spawn(async move { conn1.send_request("GetSceneList", None).await });
        let second = tokio::spawn(async move { conn2.send_request("GetStreamStatus", None).await });

        let sent_a = controller.next_sent().await.unwrap();
        let sent_b = controller.next_sent().await.unwrap();
        let by_type = |frame: &Value| {
            (
                frame["d"]["requestType"].as_str().unwrap().to_string(),
                frame["d"]["requestId"].as_str().unwrap().to_string(),
            )
        };
        let (type_a, id_a) = by_type(&sent_a);
        let (type_b, id_b) = by_type(&sent_b);

        // answer in reverse order
        controller.inject_response(&id_b, &type_b, json!({"answered": type_b}));
        controller.inject_response(&id_a, &type_a, json!({"answered": type_a}));

        assert_eq!(first.await.unwrap().unwrap()["answered"], "GetSceneList");
        assert_eq!(second.await.unwrap().unwrap()["answered"], "GetStreamStatus");
    }

    #[tokio::test]
    async fn close_fails_pending_and_later_requests() {
        let (connection, controller) = spawn_connection();

        let conn = Arc::clone(&connection);
        let pending = tokio::spawn(async move { conn.send_request("StopStream", None).await });
        controller.next_sent().await.unwrap();
        controller.inject_close(1001, "OBS is shutting down");

        match pending.await.unwrap() {
            Err(Error::ConnectionClosed { code, reason }) => {
                assert_eq!(code, Some(1001));
                assert_eq!(reason, "OBS is shutting down");
            }
            other => panic!("Expected ConnectionClosed, got {other:?}"),
        }

        assert!(connection.is_closed());
        let later = connection.send_request("GetVersion", None).await;
        assert!(matches!(later, Err(Error::ConnectionClosed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (connection, _controller) = spawn_connection();

        let result = connection.send_request("GetVersion", None).await;
        assert!(result.unwrap_err().is_timeout());
        assert!(connection.callbacks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (connection, controller) = spawn_connection();
        let mut events = connection.subscribe();

        controller.inject_event(
            "StreamStateChanged",
            json!({"outputActive": true, "outputState": "OBS_WEBSOCKET_OUTPUT_STARTED"}),
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, "StreamStateChanged");
        assert_eq!(event.event_data.unwrap()["outputActive"], true);
    }
}
