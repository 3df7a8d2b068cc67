//! Command-line interface for flitelog.
//!
//! This module provides the CLI structure and command handlers for the
//! `flitelog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AuditCommand, CacheCommand, ConfigCommand, ReportCommand, RunCommand, SweepCommand,
    SyncCommand,
};

/// flitelog - fleet flight-log compliance engine
///
/// Tracks two-tier signing of flight records, enforces tier deadlines,
/// and files completed records with the regulator.
#[derive(Debug, Parser)]
#[command(name = "flitelog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the compliance engine with all background jobs
    Run(RunCommand),

    /// Run one regulator sync pass
    Sync(SyncCommand),

    /// Run one deadline sweep
    Sweep(SweepCommand),

    /// Generate the daily compliance report
    Report(ReportCommand),

    /// Run the conformance audit over completed records
    Audit(AuditCommand),

    /// Manage the compliance-window cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
