use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "autocast")]
#[command(about = "Run a timed OBS live stream that rotates through scenes")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format for the command result
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Settings file (defaults to ./config.json when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the stream, rotate scenes until the duration elapses, then stop
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Connect and report scenes and stream state without streaming
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::Check { .. } => "check",
        }
    }

    pub fn overrides(&self) -> &Overrides {
        match self {
            Commands::Run { overrides } | Commands::Check { overrides } => overrides,
        }
    }
}

/// Command line values that replace what the settings file says.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// obs-websocket host
    #[arg(long)]
    pub host: Option<String>,

    /// obs-websocket port
    #[arg(long)]
    pub port: Option<u16>,

    /// obs-websocket password
    #[arg(long, env = "AUTOCAST_OBS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Total stream duration in seconds
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Seconds between scene switches
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Scene to rotate through; repeat for each scene, in order
    #[arg(short, long = "scene", value_name = "NAME")]
    pub scenes: Vec<String>,
}
