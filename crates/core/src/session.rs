//! The session controller: one timed run of connect, stream, rotate, stop.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──startup ok──▶ Streaming ──deadline / interrupt, stop ok──▶ Stopped
//!     │                          │
//!     └──────startup error───────┴──────────stop error──────────────────▶ Failed
//! ```
//!
//! Startup runs connect, authenticate, scene validation and stream start in
//! order; the first failure ends the session without touching the stream.
//! While streaming, one loop owns every timer. The total duration deadline
//! wins ties over the scene ticker (first tick at the Streaming transition,
//! then every interval) and over the optional clock ticker. Scene command
//! failures are logged and counted, never fatal. The connection is released
//! exactly once on the way out of every path.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use autocast_protocol::{InputSettings, StreamStatus, VersionInfo, request};
use autocast_runtime::{ClientOptions, Dialer, ObsClient};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::error::{Result, SessionError};
use crate::registry::{self, RegistryError, SceneCursor, SceneRegistry};
use crate::stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Streaming,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::NotStarted => "not started",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        })
    }
}

/// What ended the Streaming phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DeadlineReached,
    Interrupted,
}

/// Outcome of one session.
#[derive(Debug)]
pub struct SessionReport {
    pub state: SessionState,
    pub stop_reason: Option<StopReason>,
    /// Scene switch commands sent, including failed ones.
    pub scene_commands: u64,
    pub failed_scene_commands: u64,
    pub clock_updates: u64,
    pub health_warnings: u64,
    pub streamed_for: Duration,
    /// Terminal error; `None` when the session stopped cleanly.
    pub error: Option<SessionError>,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Stopped
    }

    /// 0 for a clean stop, otherwise the error's exit code.
    pub fn exit_code(&self) -> i32 {
        match &self.error {
            Some(err) => err.exit_code(),
            None if self.succeeded() => 0,
            None => 1,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    scene_commands: u64,
    failed_scene_commands: u64,
    clock_updates: u64,
    health_warnings: u64,
}

/// Runs one session against the endpoint `dialer` reaches.
pub struct SessionController<D> {
    config: SessionConfig,
    dialer: D,
    state: SessionState,
    cursor: SceneCursor,
    client: Option<ObsClient>,
    registry: Option<SceneRegistry>,
    last_status: Option<StreamStatus>,
    counters: Counters,
}

impl<D: Dialer> SessionController<D> {
    pub fn new(config: SessionConfig, dialer: D) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            dialer,
            state: SessionState::NotStarted,
            cursor: SceneCursor::default(),
            client: None,
            registry: None,
            last_status: None,
            counters: Counters::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs until the total duration elapses.
    pub async fn run(self) -> SessionReport {
        self.run_until(std::future::pending()).await
    }

    /// Runs until the total duration elapses or `shutdown` resolves.
    ///
    /// `shutdown` is only watched while streaming; startup steps are bounded
    /// by their own timeouts.
    pub async fn run_until<F>(mut self, shutdown: F) -> SessionReport
    where
        F: Future<Output = ()>,
    {
        info!(
            target: "autocast.session",
            endpoint = %self.config.connection.endpoint_url(),
            scenes = self.config.scenes.len(),
            total = ?self.config.total_duration,
            interval = ?self.config.scene_interval,
            "session starting"
        );

        if let Err(err) = self.start_up().await {
            warn!(target: "autocast.session", error = %err, "startup failed");
            self.transition(SessionState::Failed);
            return self.finish(None, Duration::ZERO, Some(err)).await;
        }

        self.transition(SessionState::Streaming);
        let started = Instant::now();
        let reason = self.stream_until_stop(started, shutdown).await;
        let streamed_for = started.elapsed();
        info!(target: "autocast.session", ?reason, elapsed = ?streamed_for, "stopping stream");

        let stopped = match &self.client {
            Some(client) => stream::stop_stream(client).await.map(|_| ()),
            None => Ok(()),
        };
        match stopped {
            Ok(()) => {
                self.transition(SessionState::Stopped);
                self.finish(Some(reason), streamed_for, None).await
            }
            Err(source) => {
                let err = SessionError::StreamStop { source };
                warn!(
                    target: "autocast.session",
                    error = %err,
                    "stream may still be live; stop it manually"
                );
                self.transition(SessionState::Failed);
                self.finish(Some(reason), streamed_for, Some(err)).await
            }
        }
    }

    async fn start_up(&mut self) -> Result<()> {
        let endpoint = self.config.connection.endpoint_url();
        let options = ClientOptions::default().with_request_timeout(self.config.request_timeout);

        let client = ObsClient::connect(&self.dialer, &endpoint, options)
            .await
            .map_err(|source| SessionError::Connection {
                endpoint: endpoint.clone(),
                source,
            })?;
        let client = self.client.insert(client);

        client
            .authenticate(self.config.connection.password.as_deref())
            .await
            .map_err(|source| SessionError::from_handshake(&endpoint, source))?;

        match client.request::<VersionInfo>(request::GET_VERSION, None).await {
            Ok(version) => info!(
                target: "autocast.session",
                obs_version = %version.obs_version,
                websocket_version = %version.obs_web_socket_version,
                "connected to OBS"
            ),
            Err(e) => warn!(
                target: "autocast.session",
                error = %e,
                "could not read application version"
            ),
        }

        let available = registry::list_available_scenes(client)
            .await
            .map_err(|source| SessionError::SceneQuery { source })?;
        let required = self.config.scenes.iter().chain(self.config.initial_scene.iter());
        let missing = registry::missing_scenes(required, &available);
        if !missing.is_empty() {
            return Err(RegistryError::UnknownScenes { missing }.into());
        }
        let registry = SceneRegistry::validate(&self.config.scenes, &available)?;
        info!(target: "autocast.session", scenes = ?registry.scenes(), "scene registry validated");

        if self.config.verify_sources {
            registry::verify_sources(client, &registry).await;
        }

        if let Some(initial) = &self.config.initial_scene {
            match registry::apply_scene(client, initial).await {
                Ok(()) => info!(target: "autocast.session", scene = %initial, "initial scene set"),
                Err(e) => warn!(
                    target: "autocast.session",
                    scene = %initial,
                    error = %e,
                    "could not set initial scene"
                ),
            }
        }

        stream::start_stream(client, self.config.stream_start_timeout)
            .await
            .map_err(|source| SessionError::StreamStart { source })?;

        self.registry = Some(registry);
        Ok(())
    }

    async fn stream_until_stop<F>(&mut self, started: Instant, shutdown: F) -> StopReason
    where
        F: Future<Output = ()>,
    {
        let deadline = sleep_until(stream::deadline_after(started, self.config.total_duration));
        let mut ticker = interval_at(started, self.config.scene_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock = interval_at(started, self.config.clock_interval);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let clock_enabled = self.config.clock_source.is_some();
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => return StopReason::DeadlineReached,
                _ = &mut shutdown => return StopReason::Interrupted,
                _ = ticker.tick() => self.tick().await,
                _ = clock.tick(), if clock_enabled => self.refresh_clock().await,
            }
        }
    }

    /// One rotation step: switch scene, then sample health when enabled.
    async fn tick(&mut self) {
        let (Some(client), Some(registry)) = (self.client.as_ref(), self.registry.as_ref()) else {
            return;
        };

        let (scene, next) = registry.next_scene(self.cursor);
        let position = self.cursor.position();
        self.cursor = next;
        self.counters.scene_commands += 1;

        match registry::apply_scene(client, scene).await {
            Ok(()) => {
                info!(target: "autocast.session", scene = %scene, tick = position, "scene switched")
            }
            Err(source) => {
                self.counters.failed_scene_commands += 1;
                let err = SessionError::SceneCommand {
                    scene: scene.clone(),
                    source,
                };
                warn!(
                    target: "autocast.session",
                    error = %err,
                    tick = position,
                    "scene switch failed; rotation continues"
                );
            }
        }

        if self.config.monitor_health {
            match stream::stream_status(client).await {
                Ok(status) => {
                    let warnings = stream::report_health(&status, self.last_status.as_ref());
                    self.counters.health_warnings += warnings as u64;
                    self.last_status = Some(status);
                }
                Err(e) => {
                    warn!(target: "autocast.session", error = %e, "could not read stream status")
                }
            }
        }
    }

    /// Writes the wall clock into the configured text input.
    async fn refresh_clock(&mut self) {
        let (Some(client), Some(input)) = (self.client.as_ref(), self.config.clock_source.as_ref())
        else {
            return;
        };

        let text = clock_text(&Local::now());
        match update_clock(client, input, &text).await {
            Ok(()) => {
                self.counters.clock_updates += 1;
                debug!(target: "autocast.session", input = %input, %text, "clock updated");
            }
            Err(e) => {
                warn!(target: "autocast.session", input = %input, error = %e, "clock update failed")
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(target: "autocast.session", from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    async fn finish(
        mut self,
        stop_reason: Option<StopReason>,
        streamed_for: Duration,
        error: Option<SessionError>,
    ) -> SessionReport {
        if let Some(mut client) = self.client.take() {
            client.disconnect().await;
        }

        let counters = std::mem::take(&mut self.counters);
        info!(
            target: "autocast.session",
            state = %self.state,
            scene_commands = counters.scene_commands,
            failed_scene_commands = counters.failed_scene_commands,
            "session finished"
        );
        SessionReport {
            state: self.state,
            stop_reason,
            scene_commands: counters.scene_commands,
            failed_scene_commands: counters.failed_scene_commands,
            clock_updates: counters.clock_updates,
            health_warnings: counters.health_warnings,
            streamed_for,
            error,
        }
    }
}

/// `[YYYY/MM/DD HH:MM:SS]`
pub fn clock_text<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    now.format("[%Y/%m/%d %H:%M:%S]").to_string()
}

async fn update_clock(client: &ObsClient, input: &str, text: &str) -> autocast_runtime::Result<()> {
    let settings = InputSettings {
        input_name: input.to_string(),
        input_settings: serde_json::json!({ "text": text }),
        overlay: Some(true),
    };
    client.send_command(request::SET_INPUT_SETTINGS, Some(serde_json::to_value(settings)?)).await?;
    Ok(())
}
