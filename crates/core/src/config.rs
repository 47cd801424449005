//! Immutable session configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use autocast_protocol::DEFAULT_PORT;
use thiserror::Error;

use crate::registry::SceneId;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_TOTAL_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_SCENE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STREAM_START_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound for every configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one scene must be configured")]
    NoScenes,

    #[error("scene names must not be blank")]
    BlankScene,

    #[error("scene {0} is listed more than once")]
    DuplicateScene(SceneId),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} must not exceed 30 days")]
    TooLong(&'static str),

    #[error("port must not be zero")]
    ZeroPort,

    #[error("host must not be empty")]
    EmptyHost,
}

/// Where the broadcast application's control endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    /// `None` when the endpoint does not require authentication.
    pub password: Option<String>,
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
        }
    }
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Sets the password; an empty string means none.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn endpoint_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Everything one session needs, fixed before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub connection: ConnectionTarget,
    /// Rotation order.
    pub scenes: Vec<SceneId>,
    pub total_duration: Duration,
    pub scene_interval: Duration,
    /// Scene made live before the stream starts.
    pub initial_scene: Option<SceneId>,
    pub stream_start_timeout: Duration,
    pub request_timeout: Duration,
    /// Text input that receives the wall clock every `clock_interval`.
    pub clock_source: Option<String>,
    pub clock_interval: Duration,
    pub monitor_health: bool,
    pub verify_sources: bool,
}

impl SessionConfig {
    /// Builds a validated configuration with default timeouts.
    pub fn new(
        connection: ConnectionTarget,
        scenes: Vec<SceneId>,
        total_duration: Duration,
        scene_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            connection,
            scenes,
            total_duration,
            scene_interval,
            initial_scene: None,
            stream_start_timeout: DEFAULT_STREAM_START_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            clock_source: None,
            clock_interval: DEFAULT_CLOCK_INTERVAL,
            monitor_health: false,
            verify_sources: true,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_initial_scene(mut self, scene: Option<SceneId>) -> Self {
        self.initial_scene = scene;
        self
    }

    pub fn with_stream_start_timeout(mut self, timeout: Duration) -> Self {
        self.stream_start_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_clock_source(mut self, source: Option<String>) -> Self {
        self.clock_source = source.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_clock_interval(mut self, interval: Duration) -> Self {
        self.clock_interval = interval;
        self
    }

    pub fn with_monitor_health(mut self, enabled: bool) -> Self {
        self.monitor_health = enabled;
        self
    }

    pub fn with_verify_sources(mut self, enabled: bool) -> Self {
        self.verify_sources = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.connection.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.scenes.is_empty() {
            return Err(ConfigError::NoScenes);
        }

        let mut seen = BTreeSet::new();
        for scene in &self.scenes {
            if scene.as_str().trim().is_empty() {
                return Err(ConfigError::BlankScene);
            }
            if !seen.insert(scene) {
                return Err(ConfigError::DuplicateScene(scene.clone()));
            }
        }
        if self.initial_scene.as_ref().is_some_and(|s| s.as_str().trim().is_empty()) {
            return Err(ConfigError::BlankScene);
        }

        for (name, value) in [
            ("total duration", self.total_duration),
            ("scene interval", self.scene_interval),
            ("stream start timeout", self.stream_start_timeout),
            ("request timeout", self.request_timeout),
            ("clock interval", self.clock_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
            if value > MAX_DURATION {
                return Err(ConfigError::TooLong(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenes(names: &[&str]) -> Vec<SceneId> {
        names.iter().copied().map(SceneId::from).collect()
    }

    fn config(names: &[&str]) -> Result<SessionConfig, ConfigError> {
        let (total, interval) = (Duration::from_secs(12), Duration::from_secs(5));
        SessionConfig::new(ConnectionTarget::default(), scenes(names), total, interval)
    }

    fn single_scene(
        target: ConnectionTarget,
        total: Duration,
        interval: Duration,
    ) -> Result<SessionConfig, ConfigError> {
        SessionConfig::new(target, scenes(&["A"]), total, interval)
    }

    #[test]
    fn defaults_point_at_local_obs() {
        let target = ConnectionTarget::default();
        assert_eq!(target.endpoint_url(), "ws://localhost:4455");
        assert!(target.password.is_none());
    }

    #[test]
    fn empty_password_means_none() {
        let target = ConnectionTarget::new("studio.lan", 4444).with_password(Some(String::new()));
        assert!(target.password.is_none());
        assert_eq!(target.endpoint_url(), "ws://studio.lan:4444");
    }

    #[test]
    fn valid_config_is_accepted() {
        let config = config(&["A", "B"]).unwrap();
        assert_eq!(config.scenes, scenes(&["A", "B"]));
        assert_eq!(config.stream_start_timeout, DEFAULT_STREAM_START_TIMEOUT);
        assert!(config.verify_sources);
    }

    #[test]
    fn scene_list_problems_are_rejected() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::NoScenes);
        assert_eq!(config(&["A", " "]).unwrap_err(), ConfigError::BlankScene);
        assert_eq!(
            config(&["A", "B", "A"]).unwrap_err(),
            ConfigError::DuplicateScene(SceneId::from("A"))
        );
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = single_scene(ConnectionTarget::default(), Duration::ZERO, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroDuration("total duration"));
        assert_eq!(err.to_string(), "total duration must be greater than zero");

        let err = single_scene(ConnectionTarget::default(), Duration::from_secs(5), Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroDuration("scene interval"));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let huge = Duration::from_secs(u64::MAX);
        let err =
            single_scene(ConnectionTarget::default(), huge, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err, ConfigError::TooLong("total duration"));
        assert_eq!(err.to_string(), "total duration must not exceed 30 days");

        let config = config(&["A"]).unwrap().with_stream_start_timeout(huge);
        assert_eq!(config.validate(), Err(ConfigError::TooLong("stream start timeout")));

        assert!(single_scene(ConnectionTarget::default(), MAX_DURATION, MAX_DURATION).is_ok());
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let (total, interval) = (Duration::from_secs(5), Duration::from_secs(1));
        let err = single_scene(ConnectionTarget::new("", 4455), total, interval).unwrap_err();
        assert_eq!(err, ConfigError::EmptyHost);

        let err = single_scene(ConnectionTarget::new("localhost", 0), total, interval).unwrap_err();
        assert_eq!(err, ConfigError::ZeroPort);
    }

    #[test]
    fn interval_longer_than_duration_is_allowed() {
        let (total, interval) = (Duration::from_secs(3), Duration::from_secs(10));
        assert!(single_scene(ConnectionTarget::default(), total, interval).is_ok());
    }

    #[test]
    fn builders_revalidate_through_validate() {
        let config = config(&["A"]).unwrap().with_stream_start_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("stream start timeout")));
    }
}
