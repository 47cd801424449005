//! Frame envelope shared by every obs-websocket message.
//!
//! ```json
//! { "op": 6, "d": { "requestType": "GetVersion", "requestId": "1" } }
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{Event, Hello, Identified, RequestResponse};

/// Message opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OpCode {
    Hello,
    Identify,
    Identified,
    Reidentify,
    Event,
    Request,
    RequestResponse,
    RequestBatch,
    RequestBatchResponse,
}

/// An opcode outside the v5 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpCode(pub u8);

impl fmt::Display for UnknownOpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown opcode {}", self.0)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OpCode::Hello,
            1 => OpCode::Identify,
            2 => OpCode::Identified,
            3 => OpCode::Reidentify,
            5 => OpCode::Event,
            6 => OpCode::Request,
            7 => OpCode::RequestResponse,
            8 => OpCode::RequestBatch,
            9 => OpCode::RequestBatchResponse,
            other => return Err(UnknownOpCode(other)),
        })
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::Hello => 0,
            OpCode::Identify => 1,
            OpCode::Identified => 2,
            OpCode::Reidentify => 3,
            OpCode::Event => 5,
            OpCode::Request => 6,
            OpCode::RequestResponse => 7,
            OpCode::RequestBatch => 8,
            OpCode::RequestBatchResponse => 9,
        }
    }
}

/// Raw `{op, d}` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: OpCode,
    #[serde(default)]
    pub d: Value,
}

impl Envelope {
    /// Wraps a typed payload.
    pub fn new<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: serde_json::to_value(payload)?,
        })
    }

    /// Decodes the payload into its typed form.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }
}

/// Frames a client can receive, decoded by opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    /// Valid opcode a client never expects from the server (e.g. batch responses).
    Unexpected(OpCode),
}

impl ServerMessage {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_value(value)?;
        Ok(match envelope.op {
            OpCode::Hello => ServerMessage::Hello(envelope.payload()?),
            OpCode::Identified => ServerMessage::Identified(envelope.payload()?),
            OpCode::Event => ServerMessage::Event(envelope.payload()?),
            OpCode::RequestResponse => ServerMessage::RequestResponse(envelope.payload()?),
            other => ServerMessage::Unexpected(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opcode_serializes_as_integer() {
        let envelope = Envelope {
            op: OpCode::Request,
            d: json!({}),
        };
        assert_eq!(serde_json::to_value(&envelope).unwrap(), json!({"op": 6, "d": {}}));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let result = serde_json::from_value::<Envelope>(json!({"op": 4, "d": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn decodes_hello_with_challenge() {
        let message = ServerMessage::from_value(json!({
            "op": 0,
            "d": {
                "obsWebSocketVersion": "5.4.2",
                "rpcVersion": 1,
                "authentication": {"challenge": "c", "salt": "s"}
            }
        }))
        .unwrap();

        match message {
            ServerMessage::Hello(hello) => {
                assert_eq!(hello.rpc_version, 1);
                let auth = hello.authentication.expect("challenge should be present");
                assert_eq!(auth.challenge, "c");
                assert_eq!(auth.salt, "s");
            }
            other => panic!("Expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn decodes_request_response_without_data() {
        let message = ServerMessage::from_value(json!({
            "op": 7,
            "d": {
                "requestType": "StopStream",
                "requestId": "9",
                "requestStatus": {"result": false, "code": 501, "comment": "not active"}
            }
        }))
        .unwrap();

        match message {
            ServerMessage::RequestResponse(response) => {
                assert_eq!(response.request_id, "9");
                assert!(!response.request_status.result);
                assert_eq!(response.request_status.code, 501);
                assert!(response.response_data.is_none());
            }
            other => panic!("Expected RequestResponse, got {other:?}"),
        }
    }

    #[test]
    fn batch_response_is_unexpected() {
        let message = ServerMessage::from_value(json!({"op": 9, "d": {}})).unwrap();
        assert_eq!(message, ServerMessage::Unexpected(OpCode::RequestBatchResponse));
    }
}
