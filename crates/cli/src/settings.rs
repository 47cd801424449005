//! The JSON settings file and command line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use autocast::{ConfigError, ConnectionTarget, SceneId, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::Overrides;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub obs: ObsSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Seconds to wait for each request's response.
    pub timeout: u64,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            host: autocast::config::DEFAULT_HOST.to_string(),
            port: ConnectionTarget::default().port,
            password: String::new(),
            timeout: autocast::config::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub scenes: Vec<String>,
    /// Total seconds on air.
    pub duration: u64,
    /// Seconds between scene switches.
    pub interval: u64,
    /// Scene to show before going live.
    pub scene_name: Option<String>,
    pub start_timeout: u64,
    /// Text input that shows the wall clock.
    pub clock_source: Option<String>,
    /// Seconds between clock refreshes.
    pub clock_interval: u64,
    pub monitor_health: bool,
    pub verify_sources: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            scenes: vec!["Scene".to_string()],
            duration: autocast::config::DEFAULT_TOTAL_DURATION.as_secs(),
            interval: autocast::config::DEFAULT_SCENE_INTERVAL.as_secs(),
            scene_name: None,
            start_timeout: autocast::config::DEFAULT_STREAM_START_TIMEOUT.as_secs(),
            clock_source: None,
            clock_interval: autocast::config::DEFAULT_CLOCK_INTERVAL.as_secs(),
            monitor_health: false,
            verify_sources: true,
        }
    }
}

impl Settings {
    /// Reads `path`, or `config.json` when it exists, or falls back to defaults.
    ///
    /// An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default_path = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if default_path.is_file() {
                    Self::read(&default_path)
                } else {
                    info!(
                        target: "autocast.settings",
                        file = DEFAULT_SETTINGS_FILE,
                        "no settings file, using defaults"
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse settings file {}", path.display()))?;
        debug!(target: "autocast.settings", file = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(host) = &overrides.host {
            self.obs.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.obs.port = port;
        }
        if let Some(password) = &overrides.password {
            self.obs.password = password.clone();
        }
        if let Some(duration) = overrides.duration {
            self.stream.duration = duration;
        }
        if let Some(interval) = overrides.interval {
            self.stream.interval = interval;
        }
        if !overrides.scenes.is_empty() {
            self.stream.scenes = overrides.scenes.clone();
        }
        self
    }

    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        let connection = ConnectionTarget::new(self.obs.host.clone(), self.obs.port)
            .with_password(Some(self.obs.password.clone()));
        let scenes = self.stream.scenes.iter().map(|name| SceneId::from(name.as_str())).collect();
        let initial_scene = self
            .stream
            .scene_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(SceneId::from);

        let total = Duration::from_secs(self.stream.duration);
        let interval = Duration::from_secs(self.stream.interval);
        let config = SessionConfig::new(connection, scenes, total, interval)?
            .with_initial_scene(initial_scene)
            .with_stream_start_timeout(Duration::from_secs(self.stream.start_timeout))
            .with_request_timeout(Duration::from_secs(self.obs.timeout))
            .with_clock_source(self.stream.clock_source.clone())
            .with_clock_interval(Duration::from_secs(self.stream.clock_interval))
            .with_monitor_health(self.stream.monitor_health)
            .with_verify_sources(self.stream.verify_sources);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn defaults_stream_one_scene_for_thirty_seconds() {
        let config = Settings::default().to_session_config().unwrap();
        assert_eq!(config.connection.endpoint_url(), "ws://localhost:4455");
        assert!(config.connection.password.is_none());
        assert_eq!(config.scenes, vec![SceneId::from("Scene")]);
        assert_eq!(config.total_duration, Duration::from_secs(30));
        assert_eq!(config.scene_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.clock_interval, Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_defaults_and_ignores_unknown_keys() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "obs": { "password": "secret" },
                "stream": {
                    "scenes": ["Intro", "Main"],
                    "duration": 3600,
                    "title": "Friday stream"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.obs.host, "localhost");
        assert_eq!(settings.obs.port, 4455);
        assert_eq!(settings.stream.interval, 5);

        let config = settings.to_session_config().unwrap();
        assert_eq!(config.connection.password.as_deref(), Some("secret"));
        assert_eq!(config.total_duration, Duration::from_secs(3600));
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = Overrides {
            host: Some("studio.lan".into()),
            port: Some(4444),
            password: None,
            duration: Some(60),
            interval: None,
            scenes: vec!["A".into(), "B".into()],
        };
        let config = Settings::default().apply(&overrides).to_session_config().unwrap();
        assert_eq!(config.connection.endpoint_url(), "ws://studio.lan:4444");
        assert_eq!(config.scenes, vec![SceneId::from("A"), SceneId::from("B")]);
        assert_eq!(config.total_duration, Duration::from_secs(60));
        assert_eq!(config.scene_interval, Duration::from_secs(5));
    }

    #[test]
    fn optional_stream_fields_map_onto_the_config() {
        let mut settings = Settings::default();
        settings.stream.scene_name = Some("Intro".into());
        settings.stream.clock_source = Some("Clock".into());
        settings.stream.clock_interval = 15;
        settings.stream.monitor_health = true;
        settings.stream.verify_sources = false;
        settings.stream.scenes = vec!["Intro".into(), "Main".into()];

        let config = settings.to_session_config().unwrap();
        assert_eq!(config.initial_scene, Some(SceneId::from("Intro")));
        assert_eq!(config.clock_source.as_deref(), Some("Clock"));
        assert_eq!(config.clock_interval, Duration::from_secs(15));
        assert!(config.monitor_health);
        assert!(!config.verify_sources);
    }

    #[test]
    fn empty_scene_name_means_no_initial_scene() {
        let mut settings = Settings::default();
        settings.stream.scene_name = Some(String::new());
        assert_eq!(settings.to_session_config().unwrap().initial_scene, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        settings.stream.scenes.clear();
        assert_eq!(settings.to_session_config().unwrap_err(), ConfigError::NoScenes);

        let mut settings = Settings::default();
        settings.obs.timeout = 0;
        assert_eq!(
            settings.to_session_config().unwrap_err(),
            ConfigError::ZeroDuration("request timeout")
        );

        let mut settings = Settings::default();
        settings.stream.duration = u64::MAX;
        assert_eq!(
            settings.to_session_config().unwrap_err(),
            ConfigError::TooLong("total duration")
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(dir.path().join("absent.json").as_path())).unwrap_err();
        assert!(format!("{err:#}").contains("cannot read settings file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"obs\": ").unwrap();
        let err = Settings::load(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().starts_with("cannot parse settings file"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_while(directive: &str, f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(directive))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn load_logs_under_a_filterable_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let shown = logged_while("autocast.settings=debug", || {
            Settings::load(Some(path.as_path())).unwrap();
        });
        assert!(shown.contains("autocast.settings"), "log: {shown}");
        assert!(shown.contains("settings loaded"), "log: {shown}");

        let hidden = logged_while("autocast.session=debug", || {
            Settings::load(Some(path.as_path())).unwrap();
        });
        assert!(!hidden.contains("settings loaded"), "log: {hidden}");
    }

    #[test]
    fn file_round_trips_through_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut settings = Settings::default();
        settings.stream.scenes = vec!["Intro".into()];
        std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        assert_eq!(Settings::load(Some(path.as_path())).unwrap(), settings);
    }
}
