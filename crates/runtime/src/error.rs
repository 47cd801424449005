//! Errors raised by the connection client.

use autocast_protocol::close;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint could not be reached (nothing listening, DNS, TLS, HTTP upgrade refused).
    #[error("cannot reach {url}: {message}")]
    Unreachable { url: String, message: String },

    /// The peer does not speak a compatible obs-websocket protocol.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The server closed the socket after `Identify` with code 4009.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server sent a challenge but no password was configured.
    #[error("server requires a password but none was configured")]
    PasswordRequired,

    /// A request was answered with `requestStatus.result == false`.
    #[error(
        "{request_type} failed with status {code}: {}",
        .comment.as_deref().unwrap_or("no comment")
    )]
    RequestFailed {
        request_type: String,
        code: u16,
        comment: Option<String>,
    },

    #[error(
        "connection closed (code {}): {reason}",
        .code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )]
    ConnectionClosed { code: Option<u16>, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("requests cannot be sent before the handshake completes")]
    NotIdentified,

    #[error("client is disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response channel closed before a reply arrived")]
    ChannelClosed,

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Credential problem the operator fixes by changing the password.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::AuthenticationFailed(_) | Error::PasswordRequired => true,
            Error::ConnectionClosed {
                code: Some(code), ..
            } => *code == close::AUTHENTICATION_FAILED,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// `requestStatus.code` of a rejected request.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::RequestFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failure_message_includes_comment() {
        let err = Error::RequestFailed {
            request_type: "StartStream".into(),
            code: 702,
            comment: Some("no stream key".into()),
        };
        assert_eq!(err.to_string(), "StartStream failed with status 702: no stream key");
        assert_eq!(err.status_code(), Some(702));
    }

    #[test]
    fn close_with_auth_code_is_auth_failure() {
        let err = Error::ConnectionClosed {
            code: Some(4009),
            reason: "Authentication failed.".into(),
        };
        assert!(err.is_auth_failure());
        assert!(!Error::Timeout("Hello".into()).is_auth_failure());
    }

    #[test]
    fn close_without_code_renders_none() {
        let err = Error::ConnectionClosed {
            code: None,
            reason: "reset".into(),
        };
        assert_eq!(err.to_string(), "connection closed (code none): reset");
    }
}
