//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Run every job once at startup instead of waiting for the first tick
    #[arg(long)]
    pub kick: bool,
}

/// Sync command arguments.
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Reset exhausted retries before syncing (the daily reprocessing pass)
    #[arg(short, long)]
    pub reprocess: bool,

    /// Probe regulator connectivity instead of submitting
    #[arg(short, long)]
    pub probe: bool,
}

/// Sweep command arguments.
#[derive(Debug, Args)]
pub struct SweepCommand {
    /// Also send near-deadline reminders to operators
    #[arg(short, long)]
    pub notify: bool,
}

/// Report command arguments.
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Conformance audit command arguments.
#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Cache maintenance commands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show cache counters
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Evict expired entries
    Evict,

    /// Build windows for active aircraft
    Preheat,

    /// Cross-check cached windows against the store and repair mismatches
    Check,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_command_debug() {
        let cmd = SyncCommand {
            reprocess: true,
            probe: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("reprocess"));
    }

    #[test]
    fn test_cache_command_debug() {
        let cmd = CacheCommand::Stats { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Stats"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
