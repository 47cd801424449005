use std::path::Path;

use autocast::{SessionController, WebSocketDialer};
use tracing::{info, warn};

use super::{Outcome, load_config};
use crate::cli::Overrides;
use crate::error::Result;

pub async fn execute(config_path: Option<&Path>, overrides: &Overrides) -> Result<Outcome> {
    let config = load_config(config_path, overrides)?;
    info!(
        target: "autocast",
        endpoint = %config.connection.endpoint_url(),
        scenes = config.scenes.len(),
        duration_secs = config.total_duration.as_secs(),
        "starting session"
    );

    let controller = SessionController::new(config, WebSocketDialer)?;
    let report = controller.run_until(interrupted()).await;
    Ok(Outcome::Run(report))
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "autocast", "interrupt received, stopping stream"),
        Err(err) => {
            warn!(target: "autocast", error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
