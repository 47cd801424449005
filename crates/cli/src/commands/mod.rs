mod check;
mod run;

use std::path::Path;

use autocast::{ProbeReport, SessionConfig, SessionError, SessionReport};

use crate::cli::{Cli, Commands, Overrides};
use crate::error::{CliError, Result};
use crate::output::{self, CommandData, RunSummary};
use crate::settings::Settings;

/// What a command produced before its exit status is decided.
#[derive(Debug)]
pub enum Outcome {
    Run(SessionReport),
    Check(ProbeReport),
}

impl Outcome {
    fn data(&self) -> CommandData {
        match self {
            Outcome::Run(report) => CommandData::Run(RunSummary::from(report)),
            Outcome::Check(report) => CommandData::Check(report.clone()),
        }
    }

    /// A failed session, or a check that found missing scenes, is an error.
    fn into_result(self) -> Result<()> {
        match self {
            Outcome::Run(report) => match report.error {
                Some(err) => Err(err.into()),
                None => Ok(()),
            },
            Outcome::Check(report) => match report.registry_error() {
                Some(err) => Err(SessionError::from(err).into()),
                None => Ok(()),
            },
        }
    }
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let format = cli.format;
    let command = cli.command.name();
    let config_path = cli.config.as_deref();

    let outcome = match &cli.command {
        Commands::Run { overrides } => run::execute(config_path, overrides).await,
        Commands::Check { overrides } => check::execute(config_path, overrides).await,
    };

    match outcome {
        Ok(outcome) => {
            let data = outcome.data();
            let result = outcome.into_result();
            output::emit(format, command, Some(&data), result.as_ref().err());
            result
        }
        Err(err) => {
            output::emit(format, command, None, Some(&err));
            Err(err)
        }
    }
}

/// Settings file, then overrides, then validation.
fn load_config(config_path: Option<&Path>, overrides: &Overrides) -> Result<SessionConfig> {
    let settings = Settings::load(config_path).map_err(CliError::Settings)?;
    Ok(settings.apply(overrides).to_session_config()?)
}
