//! Stream output lifecycle: start with confirmation, stop, status and health.

use std::fmt;
use std::time::Duration;

use autocast_protocol::{OutputStateChanged, StreamStatus, event, request, status};
use autocast_runtime::{ObsClient, Result};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, warn};

/// Congestion above which the output is considered struggling.
pub const CONGESTION_LIMIT: f64 = 0.8;
/// Share of skipped frames above which the encoder is considered overloaded.
pub const SKIPPED_FRAME_LIMIT: f64 = 0.05;
pub const MIN_BITRATE_KBPS: f64 = 500.0;

const CONFIRM_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Command(#[from] autocast_runtime::Error),

    #[error("stream output did not become active within {0:?}")]
    NotConfirmed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyInactive,
}

pub async fn stream_status(client: &ObsClient) -> Result<StreamStatus> {
    client.request(request::GET_STREAM_STATUS, None).await
}

pub async fn is_streaming(client: &ObsClient) -> Result<bool> {
    Ok(stream_status(client).await?.output_active)
}

/// `start + wait`, saturating at roughly thirty years out.
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start.checked_add(wait).unwrap_or_else(|| start + Duration::from_secs(86_400 * 365 * 30))
}

/// Starts the stream output and waits until it is confirmed active.
///
/// An output that is already running counts as started without a command.
/// Confirmation comes from a `StreamStateChanged` event or from polling the
/// output status once per second, whichever is first.
pub async fn start_stream(
    client: &ObsClient,
    confirm_timeout: Duration,
) -> std::result::Result<StartOutcome, StreamError> {
    // subscribe first so the confirming event cannot slip past
    let mut events = client.subscribe_events();

    if is_streaming(client).await? {
        info!(target: "autocast.stream", "stream output already active");
        return Ok(StartOutcome::AlreadyActive);
    }

    match client.send_command(request::START_STREAM, None).await {
        Ok(_) => {}
        Err(e) if e.status_code() == Some(status::OUTPUT_RUNNING) => {
            info!(target: "autocast.stream", "stream output already running");
            return Ok(StartOutcome::AlreadyActive);
        }
        Err(e) => return Err(e.into()),
    }
    debug!(
        target: "autocast.stream",
        timeout = ?confirm_timeout,
        "start accepted, waiting for output"
    );

    let deadline = deadline_after(Instant::now(), confirm_timeout);
    let mut poll = interval(CONFIRM_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;
            _ = sleep_until(deadline) => return Err(StreamError::NotConfirmed(confirm_timeout)),
            received = events.recv(), if events_open => match received {
                Ok(notice) if notice.event_type == event::STREAM_STATE_CHANGED => {
                    let Some(changed) = notice
                        .event_data
                        .and_then(|data| serde_json::from_value::<OutputStateChanged>(data).ok())
                    else {
                        continue;
                    };
                    debug!(
                        target: "autocast.stream",
                        state = %changed.output_state,
                        "output state changed"
                    );
                    if changed.output_active {
                        break;
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => events_open = false,
            },
            _ = poll.tick() => {
                if is_streaming(client).await? {
                    break;
                }
            }
        }
    }

    info!(target: "autocast.stream", "stream started");
    Ok(StartOutcome::Started)
}

/// Stops the stream output. An inactive output is left alone.
pub async fn stop_stream(client: &ObsClient) -> Result<StopOutcome> {
    if !is_streaming(client).await? {
        info!(target: "autocast.stream", "stream output already inactive");
        return Ok(StopOutcome::AlreadyInactive);
    }

    match client.send_command(request::STOP_STREAM, None).await {
        Ok(_) => {
            info!(target: "autocast.stream", "stream stopped");
            Ok(StopOutcome::Stopped)
        }
        Err(e) if e.status_code() == Some(status::OUTPUT_NOT_RUNNING) => {
            Ok(StopOutcome::AlreadyInactive)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthWarning {
    Inactive,
    Reconnecting,
    Congested(f64),
    SkippedFrames { skipped: u64, total: u64 },
    LowBitrate { kbps: f64 },
}

impl fmt::Display for HealthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthWarning::Inactive => f.write_str("stream output is not active"),
            HealthWarning::Reconnecting => f.write_str("stream output is reconnecting"),
            HealthWarning::Congested(congestion) => {
                write!(f, "network congestion at {:.0}%", congestion * 100.0)
            }
            HealthWarning::SkippedFrames { skipped, total } => {
                write!(f, "{skipped} of {total} frames skipped")
            }
            HealthWarning::LowBitrate { kbps } => write!(f, "bitrate down to {kbps:.0} kbps"),
        }
    }
}

/// Judges one status sample. `previous` enables the bitrate check.
pub fn assess(current: &StreamStatus, previous: Option<&StreamStatus>) -> Vec<HealthWarning> {
    let mut warnings = Vec::new();
    if !current.output_active {
        warnings.push(HealthWarning::Inactive);
        return warnings;
    }
    if current.output_reconnecting {
        warnings.push(HealthWarning::Reconnecting);
    }
    if current.output_congestion > CONGESTION_LIMIT {
        warnings.push(HealthWarning::Congested(current.output_congestion));
    }
    if current.output_total_frames > 0 {
        let ratio = current.output_skipped_frames as f64 / current.output_total_frames as f64;
        if ratio > SKIPPED_FRAME_LIMIT {
            warnings.push(HealthWarning::SkippedFrames {
                skipped: current.output_skipped_frames,
                total: current.output_total_frames,
            });
        }
    }
    match previous.and_then(|previous| bitrate_kbps(previous, current)) {
        Some(kbps) if kbps < MIN_BITRATE_KBPS => warnings.push(HealthWarning::LowBitrate { kbps }),
        _ => {}
    }
    warnings
}

/// Average bitrate between two samples of the same output.
pub fn bitrate_kbps(previous: &StreamStatus, current: &StreamStatus) -> Option<f64> {
    let elapsed_ms = current.output_duration.checked_sub(previous.output_duration)?;
    let bytes = current.output_bytes.checked_sub(previous.output_bytes)?;
    if elapsed_ms == 0 {
        return None;
    }
    // bits per millisecond == kilobits per second
    Some((bytes * 8) as f64 / elapsed_ms as f64)
}

/// Logs every warning for one sample and returns how many there were.
pub fn report_health(current: &StreamStatus, previous: Option<&StreamStatus>) -> usize {
    let warnings = assess(current, previous);
    for warning in &warnings {
        warn!(target: "autocast.stream", timecode = %current.output_timecode, "{warning}");
    }
    if warnings.is_empty() {
        debug!(
            target: "autocast.stream",
            timecode = %current.output_timecode,
            congestion = current.output_congestion,
            "stream healthy"
        );
    }
    warnings.len()
}
