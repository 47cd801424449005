//! Timed live-stream sessions for OBS.
//!
//! A [`SessionController`] connects to obs-websocket, validates the configured
//! scenes, starts the stream, rotates scenes on a fixed cadence and stops the
//! stream when the total duration has elapsed.
//!
//! ```ignore
//! let scenes = vec!["Intro".into(), "Main".into()];
//! let config = SessionConfig::new(ConnectionTarget::default(), scenes, total, interval)?;
//! let report = SessionController::new(config, WebSocketDialer)?.run().await;
//! std::process::exit(report.exit_code());
//! ```

pub mod config;
pub mod error;
pub mod probe;
pub mod registry;
pub mod session;
pub mod stream;

pub use autocast_runtime::{Dialer, WebSocketDialer};
#[cfg(feature = "fake")]
pub use autocast_runtime::FakeObs;
pub use config::{ConfigError, ConnectionTarget, SessionConfig};
pub use error::{Result, SessionError};
pub use probe::{ProbeReport, probe};
pub use registry::{RegistryError, SceneCursor, SceneId, SceneRegistry, SourceCheck};
pub use session::{SessionController, SessionReport, SessionState, StopReason};
pub use stream::{HealthWarning, StreamError};
