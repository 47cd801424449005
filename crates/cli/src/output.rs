//! Text and JSON rendering of command results.

use std::fmt::Write as _;

use autocast::{ProbeReport, SessionReport, SessionState, StopReason};
use colored::Colorize;
use serde::Serialize;

use crate::error::CliError;

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// One JSON object on stdout
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// The envelope every command prints in JSON mode.
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    pub ok: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&CliError> for CommandError {
    fn from(err: &CliError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Stable error codes for scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidConfig,
    ConnectionFailed,
    AuthFailed,
    UnknownScenes,
    StreamStartFailed,
    StreamStopFailed,
    SessionFailed,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::UnknownScenes => "UNKNOWN_SCENES",
            ErrorCode::StreamStartFailed => "STREAM_START_FAILED",
            ErrorCode::StreamStopFailed => "STREAM_STOP_FAILED",
            ErrorCode::SessionFailed => "SESSION_FAILED",
        })
    }
}

/// The serializable part of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub scene_commands: u64,
    pub failed_scene_commands: u64,
    pub clock_updates: u64,
    pub health_warnings: u64,
    pub streamed_secs: f64,
}

impl From<&SessionReport> for RunSummary {
    fn from(report: &SessionReport) -> Self {
        Self {
            state: report.state,
            stop_reason: report.stop_reason,
            scene_commands: report.scene_commands,
            failed_scene_commands: report.failed_scene_commands,
            clock_updates: report.clock_updates,
            health_warnings: report.health_warnings,
            streamed_secs: report.streamed_for.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandData {
    Run(RunSummary),
    Check(ProbeReport),
}

/// Prints the result of `command` to stdout.
///
/// Text mode prints nothing when there is no data; the error itself is
/// logged by `main`.
pub fn emit(
    format: OutputFormat,
    command: &str,
    data: Option<&CommandData>,
    error: Option<&CliError>,
) {
    match format {
        OutputFormat::Json => println!("{}", render_json(command, data, error)),
        OutputFormat::Text => {
            if let Some(data) = data {
                print!("{}", render_text(data));
            }
        }
    }
}

pub fn render_json(command: &str, data: Option<&CommandData>, error: Option<&CliError>) -> String {
    let result = CommandResult {
        ok: error.is_none(),
        command: command.to_string(),
        data,
        error: error.map(CommandError::from),
    };
    serde_json::to_string_pretty(&result).unwrap_or_else(|err| {
        serde_json::json!({
            "ok": false,
            "command": command,
            "error": { "code": ErrorCode::SessionFailed.to_string(), "message": err.to_string() },
        })
        .to_string()
    })
}

pub fn render_text(data: &CommandData) -> String {
    match data {
        CommandData::Run(summary) => render_run(summary),
        CommandData::Check(report) => render_check(report),
    }
}

fn render_run(summary: &RunSummary) -> String {
    let state = match summary.state {
        SessionState::Stopped => summary.state.to_string().green().bold(),
        SessionState::Failed => summary.state.to_string().red().bold(),
        _ => summary.state.to_string().yellow().bold(),
    };
    let mut out = String::new();
    let _ = writeln!(out, "session {state}");
    if let Some(reason) = summary.stop_reason {
        let reason = match reason {
            StopReason::DeadlineReached => "duration elapsed",
            StopReason::Interrupted => "interrupted",
        };
        let _ = writeln!(out, "  stopped because: {reason}");
    }
    let _ = writeln!(out, "  streamed for:    {:.1}s", summary.streamed_secs);
    let failed = if summary.failed_scene_commands > 0 {
        format!("{} failed", summary.failed_scene_commands).red().to_string()
    } else {
        "0 failed".to_string()
    };
    let _ = writeln!(out, "  scene switches:  {} ({failed})", summary.scene_commands);
    if summary.clock_updates > 0 {
        let _ = writeln!(out, "  clock updates:   {}", summary.clock_updates);
    }
    if summary.health_warnings > 0 {
        let warnings = summary.health_warnings.to_string().yellow();
        let _ = writeln!(out, "  health warnings: {warnings}");
    }
    out
}

fn render_check(report: &ProbeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "connected to {}", report.endpoint.bold());
    let _ = writeln!(out, "  obs:           {}", report.obs_version);
    let _ = writeln!(
        out,
        "  obs-websocket: {} (rpc {})",
        report.websocket_version, report.rpc_version
    );
    let _ = writeln!(out, "  auth required: {}", if report.auth_required { "yes" } else { "no" });
    let streaming = if report.streaming { "live".red().bold() } else { "idle".green() };
    let _ = writeln!(out, "  stream:        {streaming}");
    match &report.current_scene {
        Some(scene) => {
            let _ = writeln!(out, "  current scene: {scene}");
        }
        None => {
            let _ = writeln!(out, "  current scene: unknown");
        }
    }

    let _ = writeln!(out, "scenes ({}):", report.available_scenes.len());
    for scene in &report.available_scenes {
        let _ = writeln!(out, "  - {scene}");
    }

    for check in &report.sources {
        if check.is_blank() {
            let _ = writeln!(
                out,
                "  {} scene {} has no enabled sources",
                "warning:".yellow(),
                check.scene
            );
        }
    }

    if report.is_ready() {
        let _ = writeln!(out, "{}", "configured scenes are all present".green());
    } else {
        let missing: Vec<&str> = report.missing_scenes.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out, "{} {}", "missing scenes:".red().bold(), missing.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocast::{SceneId, SessionError, SourceCheck};
    use serde_json::Value;

    fn probe_report(missing: &[&str]) -> ProbeReport {
        ProbeReport {
            endpoint: "ws://localhost:4455".into(),
            obs_version: "30.2.0".into(),
            websocket_version: "5.5.0".into(),
            rpc_version: 1,
            auth_required: true,
            current_scene: Some(SceneId::from("Intro")),
            available_scenes: ["Intro", "Main"].into_iter().map(SceneId::from).collect(),
            streaming: false,
            missing_scenes: missing.iter().copied().map(SceneId::from).collect(),
            sources: vec![SourceCheck {
                scene: SceneId::from("Main"),
                items: 2,
                enabled: 0,
            }],
        }
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn json_envelope_carries_error_code() {
        let err = CliError::from(SessionError::Config(autocast::ConfigError::NoScenes));
        let json: Value = serde_json::from_str(&render_json("run", None, Some(&err))).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["command"], "run");
        assert_eq!(json["error"]["code"], "INVALID_CONFIG");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn json_envelope_carries_run_summary() {
        let summary = RunSummary {
            state: SessionState::Stopped,
            stop_reason: Some(StopReason::DeadlineReached),
            scene_commands: 3,
            failed_scene_commands: 0,
            clock_updates: 0,
            health_warnings: 0,
            streamed_secs: 12.0,
        };
        let rendered = render_json("run", Some(&CommandData::Run(summary)), None);
        let json: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["state"], "stopped");
        assert_eq!(json["data"]["stop_reason"], "deadline_reached");
        assert_eq!(json["data"]["scene_commands"], 3);
    }

    #[test]
    fn check_text_lists_missing_scenes_and_blank_sources() {
        colored::control::set_override(false);
        let report = probe_report(&["Outro"]);
        let text = render_text(&CommandData::Check(report));
        assert!(text.contains("connected to ws://localhost:4455"));
        assert!(text.contains("  - Main"));
        assert!(text.contains("scene Main has no enabled sources"));
        assert!(text.contains("missing scenes: Outro"));
    }

    #[test]
    fn run_text_shows_state_and_switches() {
        colored::control::set_override(false);
        let summary = RunSummary {
            state: SessionState::Stopped,
            stop_reason: Some(StopReason::Interrupted),
            scene_commands: 2,
            failed_scene_commands: 1,
            clock_updates: 0,
            health_warnings: 0,
            streamed_secs: 7.0,
        };
        let text = render_text(&CommandData::Run(summary));
        assert!(text.starts_with("session stopped"));
        assert!(text.contains("stopped because: interrupted"));
        assert!(text.contains("scene switches:  2 (1 failed)"));
        assert!(!text.contains("clock updates"));
    }
}
