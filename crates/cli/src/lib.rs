//! Command line front end for timed OBS live-stream sessions.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod settings;
