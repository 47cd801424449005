//! In-memory stand-ins for a broadcast application.
//!
//! Two layers:
//!
//! - [`FakeTransportBuilder`] produces a transport whose far end is a
//!   [`FakeTransportController`]: tests inject raw frames and read what the
//!   client sent. Used to exercise correlation and dispatch directly.
//! - [`FakeObs`] runs a scripted server on top of that controller. It performs
//!   the `Hello`/`Identify` handshake (with a real challenge when a password is
//!   set), keeps scene and stream state, answers requests with the same status
//!   codes OBS uses, and records every request with its (tokio) timestamp.
//!
//! # Example
//!
//! ```ignore
//! let obs = FakeObs::builder().scenes(["Intro", "Main"]).build();
//! let mut client = ObsClient::connect(&obs, "ws://fake:4455", ClientOptions::default()).await?;
//! client.authenticate(None).await?;
//! client.send_command("SetCurrentProgramScene", Some(json!({"sceneName": "Main"}))).await?;
//! assert_eq!(obs.current_scene().as_deref(), Some("Main"));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use autocast_protocol::{
    Envelope, Identify, OpCode, Request, close, event, output_state, request, status,
};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::auth::auth_response;
use crate::error::{Error, Result};
use crate::transport::{Dialer, Inbound, Transport, TransportParts, TransportReceiver};

/// Challenge and salt the fake server hands out when a password is set.
pub const FAKE_CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";
pub const FAKE_SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";

/// Builder for creating fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {
    close_counter: Option<Arc<AtomicUsize>>,
}

impl FakeTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares a counter incremented on every first `close()` of the sender.
    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.close_counter = Some(counter);
        self
    }

    /// Build the fake transport and return both parts and a controller.
    pub fn build(self) -> (TransportParts, FakeTransportController) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closes = self.close_counter.unwrap_or_default();

        let sender = FakeTransportSender {
            sent: Some(sent_tx),
            inbound_tx: inbound_tx.clone(),
            closes: Arc::clone(&closes),
        };
        let receiver = FakeTransportReceiver { inbound_rx, message_tx };
        let controller = FakeTransportController {
            inbound_tx,
            sent: tokio::sync::Mutex::new(sent_rx),
            closes,
        };

        let parts = TransportParts {
            sender: Box::new(sender),
            receiver: Box::new(receiver),
            message_rx,
        };
        (parts, controller)
    }
}

/// Far end of a fake transport: inject frames, inspect what was sent.
pub struct FakeTransportController {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    sent: tokio::sync::Mutex<mpsc::UnboundedReceiver<JsonValue>>,
    closes: Arc<AtomicUsize>,
}

impl FakeTransportController {
    /// Inject a raw JSON frame as if the server had sent it.
    pub fn inject(&self, message: JsonValue) {
        let _ = self.inbound_tx.send(Inbound::Message(message));
    }

    /// Simulate the server closing the socket.
    pub fn inject_close(&self, code: u16, reason: &str) {
        let _ = self.inbound_tx.send(Inbound::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub fn inject_response(&self, request_id: &str, request_type: &str, data: JsonValue) {
        self.inject(frame(
            OpCode::RequestResponse,
            json!({
                "requestType": request_type,
                "requestId": request_id,
                "requestStatus": {"result": true, "code": status::SUCCESS},
                "responseData": data,
            }),
        ));
    }

    pub fn inject_error(&self, request_id: &str, request_type: &str, code: u16, comment: &str) {
        self.inject(frame(
            OpCode::RequestResponse,
            json!({
                "requestType": request_type,
                "requestId": request_id,
                "requestStatus": {"result": false, "code": code, "comment": comment},
            }),
        ));
    }

    pub fn inject_event(&self, event_type: &str, data: JsonValue) {
        self.inject(frame(
            OpCode::Event,
            json!({"eventType": event_type, "eventIntent": 0, "eventData": data}),
        ));
    }

    /// Waits for the next frame the client sends. `None` once the client closed.
    pub async fn next_sent(&self) -> Option<JsonValue> {
        self.sent.lock().await.recv().await
    }

    /// Take all frames sent so far without waiting.
    pub async fn take_sent(&self) -> Vec<JsonValue> {
        let mut rx = self.sent.lock().await;
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct FakeTransportSender {
    sent: Option<mpsc::UnboundedSender<JsonValue>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    closes: Arc<AtomicUsize>,
}

impl Transport for FakeTransportSender {
    fn send(
        &mut self,
        message: JsonValue,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match &self.sent {
                Some(sent) => sent.send(message).map_err(|_| Error::Disconnected),
                None => Err(Error::Disconnected),
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.sent.take().is_some() {
                self.closes.fetch_add(1, Ordering::SeqCst);
                let _ = self.inbound_tx.send(Inbound::Closed {
                    code: Some(1000),
                    reason: String::new(),
                });
            }
            Ok(())
        })
    }
}

struct FakeTransportReceiver {
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    message_tx: mpsc::UnboundedSender<Inbound>,
}

impl TransportReceiver for FakeTransportReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(message) = self.inbound_rx.recv().await {
                let closed = matches!(message, Inbound::Closed { .. });
                if self.message_tx.send(message).is_err() || closed {
                    break;
                }
            }
            Ok(())
        })
    }
}

fn frame(op: OpCode, d: JsonValue) -> JsonValue {
    json!({"op": u8::from(op), "d": d})
}

/// A request as the fake server received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub at: Instant,
    pub request_type: String,
    pub data: Option<JsonValue>,
}

impl RecordedRequest {
    /// `requestData.sceneName`, when present.
    pub fn scene_name(&self) -> Option<&str> {
        self.data.as_ref()?.get("sceneName")?.as_str()
    }
}

/// Scripted obs-websocket server. Cloning shares state.
#[derive(Clone)]
pub struct FakeObs {
    state: Arc<Mutex<FakeState>>,
    closes: Arc<AtomicUsize>,
}

#[derive(Default)]
struct FakeState {
    scenes: Vec<String>,
    empty_scenes: BTreeSet<String>,
    password: Option<String>,
    rpc_version: u32,
    unreachable: bool,
    stall_stream_start: bool,
    drop_connection_after: Option<Duration>,
    fail_scene_switches: BTreeSet<usize>,
    failures: HashMap<String, (u16, String)>,
    streaming: bool,
    current_scene: Option<String>,
    inputs: HashMap<String, JsonValue>,
    scene_switch_calls: usize,
    connections: usize,
    requests: Vec<RecordedRequest>,
}

/// Configures a [`FakeObs`].
pub struct FakeObsBuilder {
    state: FakeState,
}

impl FakeObs {
    pub fn builder() -> FakeObsBuilder {
        FakeObsBuilder {
            state: FakeState {
                scenes: vec!["Scene".to_string()],
                rpc_version: autocast_protocol::RPC_VERSION,
                ..FakeState::default()
            },
        }
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_of(&self, request_type: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.request_type == request_type)
            .cloned()
            .collect()
    }

    pub fn count(&self, request_type: &str) -> usize {
        self.state.lock().requests.iter().filter(|r| r.request_type == request_type).count()
    }

    /// Scene names passed to `SetCurrentProgramScene`, including rejected ones.
    pub fn scene_switches(&self) -> Vec<String> {
        self.requests_of(request::SET_CURRENT_PROGRAM_SCENE)
            .iter()
            .filter_map(|r| r.scene_name().map(str::to_string))
            .collect()
    }

    /// Number of graceful closes initiated by clients.
    pub fn disconnects(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    pub fn current_scene(&self) -> Option<String> {
        self.state.lock().current_scene.clone()
    }

    /// Last settings applied to an input through `SetInputSettings`.
    pub fn input_settings(&self, input_name: &str) -> Option<JsonValue> {
        self.state.lock().inputs.get(input_name).cloned()
    }

    /// Flips the stream state as if the operator pressed the button in OBS.
    pub fn set_streaming(&self, streaming: bool) {
        self.state.lock().streaming = streaming;
    }
}

impl FakeObsBuilder {
    /// Scenes OBS reports, in order. The first one is live initially.
    pub fn scenes<I, S>(mut self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.scenes = scenes.into_iter().map(Into::into).collect();
        self
    }

    /// A scene without any sources.
    pub fn empty_scene(mut self, scene: impl Into<String>) -> Self {
        self.state.empty_scenes.insert(scene.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.state.password = Some(password.into());
        self
    }

    pub fn rpc_version(mut self, version: u32) -> Self {
        self.state.rpc_version = version;
        self
    }

    pub fn already_streaming(mut self) -> Self {
        self.state.streaming = true;
        self
    }

    /// Dialing fails as if nothing listened on the port.
    pub fn unreachable(mut self) -> Self {
        self.state.unreachable = true;
        self
    }

    /// `StartStream` succeeds but the output never becomes active.
    pub fn stall_stream_start(mut self) -> Self {
        self.state.stall_stream_start = true;
        self
    }

    /// Rejects the `nth` (1-based) `SetCurrentProgramScene` call.
    pub fn fail_scene_switch(mut self, nth: usize) -> Self {
        self.state.fail_scene_switches.insert(nth);
        self
    }

    /// Closes the socket with 1006 this long after a client identifies.
    pub fn drop_connection_at(mut self, after: Duration) -> Self {
        self.state.drop_connection_after = Some(after);
        self
    }

    /// Answers every `request_type` with the given failure status.
    pub fn fail_request(mut self, request_type: &str, code: u16, comment: &str) -> Self {
        self.state.failures.insert(request_type.to_string(), (code, comment.to_string()));
        self
    }

    pub fn build(mut self) -> FakeObs {
        self.state.current_scene = self.state.scenes.first().cloned();
        FakeObs {
            state: Arc::new(Mutex::new(self.state)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Dialer for FakeObs {
    fn dial<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut state = self.state.lock();
                if state.unreachable {
                    return Err(Error::Unreachable {
                        url: url.to_string(),
                        message: "connection refused".to_string(),
                    });
                }
                state.connections += 1;
            }

            let (parts, controller) = FakeTransportBuilder::new()
                .with_close_counter(Arc::clone(&self.closes))
                .build();
            tokio::spawn(serve(Arc::clone(&self.state), controller));
            Ok(parts)
        })
    }
}

async fn serve(state: Arc<Mutex<FakeState>>, controller: FakeTransportController) {
    let (password, rpc_version, drop_after) = {
        let state = state.lock();
        (state.password.clone(), state.rpc_version, state.drop_connection_after)
    };

    let mut hello = json!({"obsWebSocketVersion": "5.4.2", "rpcVersion": rpc_version});
    if password.is_some() {
        hello["authentication"] = json!({"challenge": FAKE_CHALLENGE, "salt": FAKE_SALT});
    }
    controller.inject(frame(OpCode::Hello, hello));

    let mut identified = false;
    let mut drop_at: Option<Instant> = None;
    loop {
        let sent = tokio::select! {
            sent = controller.next_sent() => sent,
            _ = wait_until(drop_at) => {
                controller.inject_close(close::ABNORMAL, "Connection lost.");
                return;
            }
        };
        let Some(sent) = sent else {
            return;
        };
        let Ok(envelope) = serde_json::from_value::<Envelope>(sent) else {
            controller.inject_close(close::MESSAGE_DECODE_ERROR, "Message could not be decoded.");
            return;
        };

        match envelope.op {
            OpCode::Identify => {
                let Ok(identify) = envelope.payload::<Identify>() else {
                    let reason = "Identify could not be decoded.";
                    controller.inject_close(close::MESSAGE_DECODE_ERROR, reason);
                    return;
                };
                if identified {
                    controller.inject_close(close::ALREADY_IDENTIFIED, "Already identified.");
                    return;
                }
                if identify.rpc_version > rpc_version {
                    controller.inject_close(
                        close::UNSUPPORTED_RPC_VERSION,
                        "Requested an unsupported RPC version.",
                    );
                    return;
                }
                let expected = password.as_deref().map(|p| {
                    auth_response(
                        p,
                        &autocast_protocol::AuthChallenge {
                            challenge: FAKE_CHALLENGE.to_string(),
                            salt: FAKE_SALT.to_string(),
                        },
                    )
                });
                if expected.is_some() && expected != identify.authentication {
                    controller.inject_close(close::AUTHENTICATION_FAILED, "Authentication failed.");
                    return;
                }
                identified = true;
                drop_at = drop_after.map(|after| Instant::now() + after);
                controller.inject(frame(
                    OpCode::Identified,
                    json!({"negotiatedRpcVersion": identify.rpc_version}),
                ));
            }
            OpCode::Request => {
                if !identified {
                    controller.inject_close(close::NOT_IDENTIFIED, "Not identified.");
                    return;
                }
                let Ok(req) = envelope.payload::<Request>() else {
                    let reason = "Request could not be decoded.";
                    controller.inject_close(close::MESSAGE_DECODE_ERROR, reason);
                    return;
                };
                let reply = state.lock().handle(&req);
                trace!(
                    target: "autocast.fake",
                    request_type = %req.request_type,
                    code = reply.code,
                    "fake reply"
                );

                let mut status_block =
                    json!({"result": reply.code == status::SUCCESS, "code": reply.code});
                if let Some(comment) = &reply.comment {
                    status_block["comment"] = json!(comment);
                }
                let mut response = json!({
                    "requestType": req.request_type,
                    "requestId": req.request_id,
                    "requestStatus": status_block,
                });
                if let Some(data) = reply.data {
                    response["responseData"] = data;
                }
                controller.inject(frame(OpCode::RequestResponse, response));
                for (event_type, data) in reply.events {
                    controller.inject_event(event_type, data);
                }
            }
            _ => {}
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct Reply {
    code: u16,
    comment: Option<String>,
    data: Option<JsonValue>,
    events: Vec<(&'static str, JsonValue)>,
}

impl Reply {
    fn ok(data: JsonValue) -> Self {
        Self {
            code: status::SUCCESS,
            comment: None,
            data: Some(data),
            events: Vec::new(),
        }
    }

    fn empty() -> Self {
        Self {
            data: None,
            ..Self::ok(JsonValue::Null)
        }
    }

    fn fail(code: u16, comment: impl Into<String>) -> Self {
        Self {
            code,
            comment: Some(comment.into()),
            data: None,
            events: Vec::new(),
        }
    }

    fn missing_field(field: &str) -> Self {
        Self::fail(
            status::MISSING_REQUEST_FIELD,
            format!("Your request is missing the `{field}` field."),
        )
    }

    fn unknown_source(name: &str) -> Self {
        Self::fail(
            status::RESOURCE_NOT_FOUND,
            format!("No source was found by the name of `{name}`."),
        )
    }

    fn with_event(mut self, event_type: &'static str, data: JsonValue) -> Self {
        self.events.push((event_type, data));
        self
    }

    fn with_output_state(self, active: bool, state: &str) -> Self {
        self.with_event(
            event::STREAM_STATE_CHANGED,
            json!({"outputActive": active, "outputState": state}),
        )
    }
}

impl FakeState {
    fn handle(&mut self, req: &Request) -> Reply {
        self.requests.push(RecordedRequest {
            at: Instant::now(),
            request_type: req.request_type.clone(),
            data: req.request_data.clone(),
        });

        if req.request_type == request::SET_CURRENT_PROGRAM_SCENE {
            self.scene_switch_calls += 1;
            if self.fail_scene_switches.contains(&self.scene_switch_calls) {
                return Reply::fail(status::REQUEST_PROCESSING_FAILED, "Scene switch rejected.");
            }
        }
        if let Some((code, comment)) = self.failures.get(&req.request_type) {
            return Reply::fail(*code, comment.clone());
        }

        let scene_name = req
            .request_data
            .as_ref()
            .and_then(|d| d.get("sceneName"))
            .and_then(JsonValue::as_str);

        match req.request_type.as_str() {
            request::GET_VERSION => Reply::ok(json!({
                "obsVersion": "30.1.2",
                "obsWebSocketVersion": "5.4.2",
                "rpcVersion": self.rpc_version,
                "availableRequests": [
                    request::GET_VERSION,
                    request::GET_SCENE_LIST,
                    request::GET_CURRENT_PROGRAM_SCENE,
                    request::SET_CURRENT_PROGRAM_SCENE,
                    request::GET_SCENE_ITEM_LIST,
                    request::START_STREAM,
                    request::STOP_STREAM,
                    request::GET_STREAM_STATUS,
                    request::SET_INPUT_SETTINGS,
                ],
                "platform": "fake",
                "platformDescription": "in-memory test server",
            })),
            request::GET_SCENE_LIST => {
                let count = self.scenes.len();
                let scenes: Vec<_> = self
                    .scenes
                    .iter()
                    .enumerate()
                    .map(|(i, name)| json!({"sceneIndex": count - 1 - i, "sceneName": name}))
                    .collect();
                Reply::ok(json!({
                    "currentProgramSceneName": self.current_scene,
                    "currentPreviewSceneName": null,
                    "scenes": scenes,
                }))
            }
            request::GET_CURRENT_PROGRAM_SCENE => match &self.current_scene {
                Some(scene) => {
                    Reply::ok(json!({"currentProgramSceneName": scene, "sceneName": scene}))
                }
                None => Reply::fail(status::RESOURCE_NOT_FOUND, "No current program scene."),
            },
            request::SET_CURRENT_PROGRAM_SCENE => match scene_name {
                None => Reply::missing_field("sceneName"),
                Some(name) if !self.scenes.iter().any(|s| s == name) => Reply::unknown_source(name),
                Some(name) => {
                    self.current_scene = Some(name.to_string());
                    let changed = json!({"sceneName": name});
                    Reply::empty().with_event(event::CURRENT_PROGRAM_SCENE_CHANGED, changed)
                }
            },
            request::GET_SCENE_ITEM_LIST => match scene_name {
                None => Reply::missing_field("sceneName"),
                Some(name) if !self.scenes.iter().any(|s| s == name) => Reply::unknown_source(name),
                Some(name) if self.empty_scenes.contains(name) => {
                    Reply::ok(json!({"sceneItems": []}))
                }
                Some(name) => Reply::ok(json!({"sceneItems": [
                    {
                        "sceneItemId": 1,
                        "sourceName": format!("{name} Camera"),
                        "sceneItemEnabled": true,
                        "inputKind": "v4l2_input",
                    },
                    {
                        "sceneItemId": 2,
                        "sourceName": "Clock",
                        "sceneItemEnabled": true,
                        "inputKind": "text_ft2_source_v2",
                    },
                ]})),
            },
            request::START_STREAM => {
                if self.streaming {
                    Reply::fail(status::OUTPUT_RUNNING, "The stream output is already running.")
                } else if self.stall_stream_start {
                    Reply::empty().with_output_state(false, output_state::STARTING)
                } else {
                    self.streaming = true;
                    Reply::empty()
                        .with_output_state(false, output_state::STARTING)
                        .with_output_state(true, output_state::STARTED)
                }
            }
            request::STOP_STREAM => {
                if self.streaming {
                    self.streaming = false;
                    Reply::empty()
                        .with_output_state(false, output_state::STOPPING)
                        .with_output_state(false, output_state::STOPPED)
                } else {
                    Reply::fail(status::OUTPUT_NOT_RUNNING, "The stream output is not running.")
                }
            }
            request::GET_STREAM_STATUS => Reply::ok(json!({
                "outputActive": self.streaming,
                "outputReconnecting": false,
                "outputTimecode": "00:00:00.000",
                "outputDuration": 0,
                "outputCongestion": 0.0,
                "outputBytes": 0,
                "outputSkippedFrames": 0,
                "outputTotalFrames": 0,
            })),
            request::SET_INPUT_SETTINGS => {
                let data = req.request_data.clone().unwrap_or_default();
                match data.get("inputName").and_then(JsonValue::as_str) {
                    Some(input) => {
                        let settings = data.get("inputSettings").cloned().unwrap_or_default();
                        self.inputs.insert(input.to_string(), settings);
                        Reply::empty()
                    }
                    None => Reply::missing_field("inputName"),
                }
            }
            other => Reply::fail(
                status::UNKNOWN_REQUEST_TYPE,
                format!("Your request type `{other}` is not valid."),
            ),
        }
    }
}
