//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{ExecCommand, ValidateCommand};
use std::ffi::OsString;

/// Run Vela pipelines on the local machine
#[derive(Debug, Parser, Clone)]
#[command(name = "vela")]
#[command(version)]
#[command(about = "Run Vela pipelines locally with Docker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true, env = "VELA_VERBOSE")]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compile and run a pipeline in local containers
    Exec(ExecCommand),

    /// Compile a pipeline and print the resulting build
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
