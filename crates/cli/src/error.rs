use autocast::{ConfigError, SessionError};
use thiserror::Error;

use crate::output::ErrorCode;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// The settings file could not be read or parsed.
    #[error("{0:#}")]
    Settings(anyhow::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Session(SessionError::Config(err))
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Settings(_) => 2,
            CliError::Session(err) => err.exit_code(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CliError::Settings(_) => ErrorCode::InvalidConfig,
            CliError::Session(err) => match err {
                SessionError::Config(_) => ErrorCode::InvalidConfig,
                SessionError::Connection { .. } => ErrorCode::ConnectionFailed,
                SessionError::Auth { .. } => ErrorCode::AuthFailed,
                SessionError::Registry(_) => ErrorCode::UnknownScenes,
                SessionError::StreamStart { .. } => ErrorCode::StreamStartFailed,
                SessionError::StreamStop { .. } => ErrorCode::StreamStopFailed,
                SessionError::SceneQuery { .. } | SessionError::SceneCommand { .. } => {
                    ErrorCode::SessionFailed
                }
            },
        }
    }
}
