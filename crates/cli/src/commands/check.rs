use std::path::Path;

use autocast::{WebSocketDialer, probe};

use super::{Outcome, load_config};
use crate::cli::Overrides;
use crate::error::Result;

pub async fn execute(config_path: Option<&Path>, overrides: &Overrides) -> Result<Outcome> {
    let config = load_config(config_path, overrides)?;
    let report = probe(&config, &WebSocketDialer).await?;
    Ok(Outcome::Check(report))
}
