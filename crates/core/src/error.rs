use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::{RegistryError, SceneId};
use crate::stream::StreamError;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Why a session failed, or why a scene tick went wrong.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Nothing answered at the endpoint, or it did not speak the protocol.
    #[error("cannot connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: autocast_runtime::Error,
    },

    #[error("cannot authenticate: {source}")]
    Auth {
        #[source]
        source: autocast_runtime::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("cannot list scenes: {source}")]
    SceneQuery {
        #[source]
        source: autocast_runtime::Error,
    },

    #[error("cannot start stream: {source}")]
    StreamStart {
        #[source]
        source: StreamError,
    },

    #[error("cannot stop stream: {source}")]
    StreamStop {
        #[source]
        source: autocast_runtime::Error,
    },

    /// Reported and swallowed; rotation continues.
    #[error("cannot switch to scene {scene}: {source}")]
    SceneCommand {
        scene: SceneId,
        #[source]
        source: autocast_runtime::Error,
    },
}

impl SessionError {
    /// Splits a handshake failure into credential and connection problems.
    pub fn from_handshake(endpoint: &str, source: autocast_runtime::Error) -> Self {
        if source.is_auth_failure() {
            SessionError::Auth { source }
        } else {
            SessionError::Connection {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }

    /// Process exit status for a session that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Config(_) => 2,
            SessionError::Connection { .. } => 3,
            SessionError::Auth { .. } => 4,
            SessionError::Registry(_) => 5,
            SessionError::StreamStart { .. } => 6,
            SessionError::StreamStop { .. } => 7,
            SessionError::SceneQuery { .. } | SessionError::SceneCommand { .. } => 1,
        }
    }

    /// Occurred during a scene tick and did not end the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::SceneCommand { .. })
    }
}
