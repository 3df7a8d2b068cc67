//! Configuration management for flitelog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "flitelog.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "flitelog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "flitelog.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FLITELOG_`)
/// 2. TOML config file at `~/.config/flitelog/flitelog.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Regulator sync configuration.
    pub sync: SyncConfig,
    /// Compliance-window cache configuration.
    pub cache: CacheConfig,
    /// Reporting and conformance-audit configuration.
    pub report: ReportConfig,
    /// Regulator adapter selection.
    pub regulator: RegulatorConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/flitelog/flitelog.db`
    pub database_path: Option<PathBuf>,
    /// Path to the JSON-lines audit log.
    /// When unset, audit entries go to the structured log only.
    pub audit_log_path: Option<PathBuf>,
}

/// Scheduler-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Deadline sweep interval in minutes.
    pub sweep_interval_minutes: u32,
    /// Near-deadline notification interval in minutes.
    pub notify_interval_minutes: u32,
    /// Sync run interval in minutes.
    pub sync_interval_minutes: u32,
    /// Failed-sync reprocessing interval in hours.
    pub reprocess_interval_hours: u32,
    /// Regulator connectivity probe interval in hours.
    pub probe_interval_hours: u32,
    /// Daily compliance report interval in hours.
    pub report_interval_hours: u32,
    /// Conformance audit interval in hours.
    pub audit_interval_hours: u32,
    /// Cache maintenance interval in hours.
    pub cache_interval_hours: u32,
    /// Retry attempts per job run on transient failures.
    pub job_retry_attempts: u32,
    /// Delay between job retry attempts in seconds.
    pub job_retry_delay_secs: u32,
    /// Time budget per job run in seconds; runs end at the next safe
    /// boundary once elapsed. 0 means unbounded.
    pub job_time_budget_secs: u32,
    /// First hour (UTC, inclusive) of the business-hours window for
    /// near-deadline notifications.
    pub business_hours_start: u32,
    /// Last hour (UTC, exclusive) of the business-hours window.
    pub business_hours_end: u32,
    /// First hour (UTC, inclusive) of the off-peak window for cache
    /// preheating.
    pub off_peak_start: u32,
    /// Last hour (UTC, exclusive) of the off-peak window.
    pub off_peak_end: u32,
}

/// Regulator sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout per submission attempt in seconds.
    pub submit_timeout_secs: u32,
    /// Per-record backoff tiers in minutes; attempt N+1 waits out tier N.
    pub backoff_tiers_minutes: Vec<u32>,
    /// Attempts per record before it is parked for the reprocessing pass.
    pub max_attempts: u32,
    /// Run volume above which failures-exceed-successes raises a critical
    /// alert.
    pub systemic_failure_threshold: usize,
    /// Hours after which an in-flight claim counts as abandoned.
    pub stale_in_flight_hours: u32,
}

/// Compliance-window cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in hours.
    pub ttl_hours: u32,
    /// Upper bound on keys examined per eviction pass.
    pub eviction_scan_limit: usize,
    /// Aircraft sampled per integrity check.
    pub integrity_sample_size: usize,
}

/// Reporting and conformance-audit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Completed records sampled per conformance audit.
    pub conformance_sample_size: usize,
    /// Conformance score (percent) below which a critical alert fires.
    pub conformance_critical_threshold: f64,
}

/// Which regulator adapter to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulatorMode {
    /// Write one JSON envelope per record into a drop directory.
    #[default]
    FileExchange,
    /// In-memory double; submissions succeed but go nowhere.
    Memory,
}

/// Regulator adapter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    /// Submission strategy, selected at startup.
    pub mode: RegulatorMode,
    /// Drop directory for the file-exchange adapter.
    /// Defaults to `~/.local/share/flitelog/outbox`
    pub drop_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_minutes: 60,
            notify_interval_minutes: 30,
            sync_interval_minutes: 60,
            reprocess_interval_hours: 24,
            probe_interval_hours: 4,
            report_interval_hours: 24,
            audit_interval_hours: 168,
            cache_interval_hours: 24,
            job_retry_attempts: 3,
            job_retry_delay_secs: 30,
            job_time_budget_secs: 300,
            business_hours_start: 8,
            business_hours_end: 18,
            off_peak_start: 2,
            off_peak_end: 5,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: 30,
            backoff_tiers_minutes: vec![5, 10, 30, 60],
            max_attempts: 4,
            systemic_failure_threshold: 10,
            stale_in_flight_hours: 2,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            eviction_scan_limit: 1000,
            integrity_sample_size: 25,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            conformance_sample_size: 100,
            conformance_critical_threshold: 95.0,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `FLITELOG_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("FLITELOG_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.job_retry_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "job_retry_attempts must be at least 1".to_string(),
            });
        }

        for (name, value) in [
            ("sweep_interval_minutes", self.scheduler.sweep_interval_minutes),
            ("notify_interval_minutes", self.scheduler.notify_interval_minutes),
            ("sync_interval_minutes", self.scheduler.sync_interval_minutes),
        ] {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        for (name, hour) in [
            ("business_hours_start", self.scheduler.business_hours_start),
            ("business_hours_end", self.scheduler.business_hours_end),
            ("off_peak_start", self.scheduler.off_peak_start),
            ("off_peak_end", self.scheduler.off_peak_end),
        ] {
            if hour > 24 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be an hour between 0 and 24"),
                });
            }
        }

        if self.sync.max_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "sync max_attempts must be at least 1".to_string(),
            });
        }

        if self.sync.backoff_tiers_minutes.is_empty() {
            return Err(Error::ConfigValidation {
                message: "sync backoff_tiers_minutes must not be empty".to_string(),
            });
        }

        if self.cache.integrity_sample_size == 0 {
            return Err(Error::ConfigValidation {
                message: "cache integrity_sample_size must be at least 1".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&self.report.conformance_critical_threshold) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "conformance_critical_threshold ({}) must be between 0 and 100",
                    self.report.conformance_critical_threshold
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the regulator drop directory, resolving defaults if not set.
    #[must_use]
    pub fn drop_dir(&self) -> PathBuf {
        self.regulator
            .drop_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("outbox"))
    }

    /// Get the submission timeout as a Duration.
    #[must_use]
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync.submit_timeout_secs))
    }

    /// Get the per-record backoff tiers as Durations.
    #[must_use]
    pub fn backoff_tiers(&self) -> Vec<chrono::Duration> {
        self.sync
            .backoff_tiers_minutes
            .iter()
            .map(|m| chrono::Duration::minutes(i64::from(*m)))
            .collect()
    }

    /// Get the stale in-flight cutoff as a chrono Duration.
    #[must_use]
    pub fn stale_in_flight(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.sync.stale_in_flight_hours))
    }

    /// Get the cache entry time-to-live as a chrono Duration.
    #[must_use]
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cache.ttl_hours))
    }

    /// Get the delay between job retry attempts as a Duration.
    #[must_use]
    pub fn job_retry_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.scheduler.job_retry_delay_secs))
    }

    /// Get the per-run job time budget; `None` means unbounded.
    #[must_use]
    pub fn job_time_budget(&self) -> Option<Duration> {
        if self.scheduler.job_time_budget_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(
                self.scheduler.job_time_budget_secs,
            )))
        }
    }
}
