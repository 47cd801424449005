//! Tests for WebSocketTransport and ObsClient over a real socket

use autocast_protocol::{AuthChallenge, VersionInfo, request};
use autocast_runtime::{
    ClientOptions, Error, Inbound, ObsClient, WebSocketDialer, WebSocketTransport, auth_response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

fn parse(message: Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(&text).expect("frame should be JSON"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_transport_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        let incoming = parse(ws_rx.next().await.unwrap().unwrap());
        assert_eq!(incoming["op"], 1);

        ws_tx.send(text(json!({"op": 2, "d": {"negotiatedRpcVersion": 1}}))).await.unwrap();
    });

    let url = format!("ws://{addr}");
    let (transport, message_rx) = WebSocketTransport::connect(&url).await.unwrap();
    let parts = transport.into_transport_parts(message_rx);

    let mut sender = parts.sender;
    let receiver = parts.receiver;
    let mut rx = parts.message_rx;

    let recv_task = tokio::spawn(async move { receiver.run().await });

    sender.send(json!({"op": 1, "d": {"rpcVersion": 1}})).await.unwrap();

    match rx.recv().await.expect("should receive reply") {
        Inbound::Message(reply) => assert_eq!(reply["d"]["negotiatedRpcVersion"], 1),
        other => panic!("expected message, got {other:?}"),
    }

    // Receiver may exit with an error after the server hangs up; that's OK.
    recv_task.abort();
    let _ = recv_task.await;
    server.await.unwrap();
}

#[tokio::test]
async fn close_code_reaches_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(4009),
            reason: "Authentication failed.".into(),
        })))
        .await
        .unwrap();
    });

    let (transport, message_rx) =
        WebSocketTransport::connect(&format!("ws://{addr}")).await.unwrap();
    let parts = transport.into_transport_parts(message_rx);
    let mut rx = parts.message_rx;
    let recv_task = tokio::spawn(parts.receiver.run());

    assert_eq!(
        rx.recv().await,
        Some(Inbound::Closed {
            code: Some(4009),
            reason: "Authentication failed.".into()
        })
    );

    let _ = recv_task.await;
    drop(parts.sender);
    server.await.unwrap();
}

#[tokio::test]
async fn connect_to_closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = WebSocketTransport::connect(&format!("ws://{addr}"))
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, Error::Unreachable { .. }), "got {err:?}");
}

#[tokio::test]
async fn client_handshake_and_request_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        ws_tx
            .send(text(json!({"op": 0, "d": {
                "obsWebSocketVersion": "5.4.2",
                "rpcVersion": 1,
                "authentication": {"challenge": CHALLENGE, "salt": SALT}
            }})))
            .await
            .unwrap();

        let identify = parse(ws_rx.next().await.unwrap().unwrap());
        assert_eq!(identify["op"], 1);
        assert_eq!(identify["d"]["authentication"], "sQBlPUYd9mki/3XVFBp4Pt08FCMWdMVIqnFWdEitUME=");
        ws_tx.send(text(json!({"op": 2, "d": {"negotiatedRpcVersion": 1}}))).await.unwrap();

        let request = parse(ws_rx.next().await.unwrap().unwrap());
        assert_eq!(request["op"], 6);
        assert_eq!(request["d"]["requestType"], "GetVersion");
        ws_tx
            .send(text(json!({"op": 7, "d": {
                "requestType": "GetVersion",
                "requestId": request["d"]["requestId"],
                "requestStatus": {"result": true, "code": 100},
                "responseData": {
                    "obsVersion": "30.1.2",
                    "obsWebSocketVersion": "5.4.2",
                    "rpcVersion": 1,
                    "availableRequests": ["GetVersion"]
                }
            }})))
            .await
            .unwrap();

        // client closes gracefully
        let mut saw_close = false;
        while let Some(Ok(message)) = ws_rx.next().await {
            if let Message::Close(_) = message {
                saw_close = true;
            }
        }
        saw_close
    });

    let url = format!("ws://{addr}");
    let mut client = ObsClient::connect(&WebSocketDialer, &url, ClientOptions::default())
        .await
        .expect("should connect");
    assert!(client.requires_auth());

    client.authenticate(Some("supersecret")).await.expect("should authenticate");
    let version: VersionInfo = client
        .request(request::GET_VERSION, None)
        .await
        .expect("should get version");
    assert_eq!(version.obs_version, "30.1.2");

    client.disconnect().await;
    client.disconnect().await;
    assert!(server.await.unwrap(), "server should observe a close frame");
}

#[test]
fn reference_auth_string_matches_server_expectation() {
    let challenge = AuthChallenge {
        challenge: CHALLENGE.into(),
        salt: SALT.into(),
    };
    assert_eq!(
        auth_response("supersecret", &challenge),
        "sQBlPUYd9mki/3XVFBp4Pt08FCMWdMVIqnFWdEitUME="
    );
}
