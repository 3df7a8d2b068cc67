//! `flitelog` - CLI for the fleet flight-log compliance engine
//!
//! This binary wires the storage, regulator, and notification adapters
//! together and exposes the engine as one-off commands plus a long-running
//! `run` mode with all background jobs scheduled.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use flitelog::audit::{AuditSink, FanoutAuditSink, JsonFileAuditSink, TracingAuditSink};
use flitelog::cache::maintenance::{CacheMaintenance, CacheMaintenanceJob};
use flitelog::cache::MemoryCacheStore;
use flitelog::cli::{
    AuditCommand, CacheCommand, Cli, Command, ConfigCommand, ReportCommand, RunCommand,
    SweepCommand, SyncCommand,
};
use flitelog::clock::{Clock, SystemClock};
use flitelog::init_logging;
use flitelog::notify::LogNotifier;
use flitelog::report::{ComplianceReporter, ConformanceAuditJob, DailyReportJob};
use flitelog::scheduler::{
    run_with_retry, HourWindow, Job, JobSchedule, RetryPolicy, RunContext, Scheduler,
};
use flitelog::signing::SignatureService;
use flitelog::sweep::{DeadlineSweep, NearDeadlineJob, SweepJob};
use flitelog::sync::{ProbeJob, RegulatorSync, ReprocessJob, SyncJob};
use flitelog::{Config, SqliteRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        // Config commands never need the database
        Command::Config(cmd) => handle_config(&config, cmd),
        command => {
            let engine = Engine::build(&config).context("initializing engine")?;
            match command {
                Command::Run(cmd) => handle_run(&engine, &cmd).await,
                Command::Sync(cmd) => handle_sync(&engine, &cmd).await,
                Command::Sweep(cmd) => handle_sweep(&engine, &cmd).await,
                Command::Report(cmd) => handle_report(&engine, &cmd).await,
                Command::Audit(cmd) => handle_audit(&engine, &cmd).await,
                Command::Cache(cmd) => handle_cache(&engine, &cmd).await,
                Command::Config(_) => unreachable!("handled above"),
            }
        }
    }
}

/// The wired-up compliance engine.
#[derive(Debug)]
struct Engine {
    config: Config,
    clock: Arc<dyn Clock>,
    maintenance: Arc<CacheMaintenance>,
    sweep: Arc<DeadlineSweep>,
    sync: Arc<RegulatorSync>,
    reporter: Arc<ComplianceReporter>,
}

impl Engine {
    /// Open the store and wire every service to its adapters.
    fn build(config: &Config) -> anyhow::Result<Self> {
        let database_path = config.database_path();
        let repo = Arc::new(
            SqliteRepository::open(&database_path)
                .with_context(|| format!("opening {}", database_path.display()))?,
        );

        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink)];
        if let Some(path) = &config.storage.audit_log_path {
            sinks.push(Arc::new(
                JsonFileAuditSink::open(path)
                    .with_context(|| format!("opening audit log {}", path.display()))?,
            ));
        }
        let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(sinks));

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier = Arc::new(LogNotifier);
        let regulator = flitelog::regulator::from_config(config)?;
        let store = Arc::new(MemoryCacheStore::new());

        let signing = Arc::new(SignatureService::new(
            repo.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let sweep = Arc::new(DeadlineSweep::new(
            repo.clone(),
            notifier.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let sync = Arc::new(RegulatorSync::new(
            repo.clone(),
            regulator,
            audit.clone(),
            notifier.clone(),
            clock.clone(),
            config,
        ));
        let reporter = Arc::new(ComplianceReporter::new(
            repo.clone(),
            signing,
            audit,
            notifier,
            clock.clone(),
            config,
        ));
        let maintenance = Arc::new(CacheMaintenance::new(
            repo,
            store,
            clock.clone(),
            config.cache_ttl(),
            config.cache.eviction_scan_limit,
            config.cache.integrity_sample_size,
        ));

        Ok(Self {
            config: config.clone(),
            clock,
            maintenance,
            sweep,
            sync,
            reporter,
        })
    }

    fn run_context(&self) -> RunContext {
        RunContext::new(self.config.job_time_budget())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.config.scheduler.job_retry_attempts,
            delay: self.config.job_retry_delay(),
        }
    }

    fn jobs(&self) -> Vec<(Arc<dyn Job>, JobSchedule)> {
        let scheduler = &self.config.scheduler;
        let minutes = |m: u32| Duration::from_secs(u64::from(m) * 60);
        let hours = |h: u32| Duration::from_secs(u64::from(h) * 3600);

        vec![
            (
                Arc::new(SweepJob(self.sweep.clone())) as Arc<dyn Job>,
                JobSchedule::every(minutes(scheduler.sweep_interval_minutes)),
            ),
            (
                Arc::new(NearDeadlineJob(self.sweep.clone())),
                JobSchedule::every(minutes(scheduler.notify_interval_minutes)).within(
                    HourWindow {
                        start: scheduler.business_hours_start,
                        end: scheduler.business_hours_end,
                    },
                ),
            ),
            (
                Arc::new(SyncJob(self.sync.clone())),
                JobSchedule::every(minutes(scheduler.sync_interval_minutes)),
            ),
            (
                Arc::new(ReprocessJob(self.sync.clone())),
                JobSchedule::every(hours(scheduler.reprocess_interval_hours)),
            ),
            (
                Arc::new(ProbeJob(self.sync.clone())),
                JobSchedule::every(hours(scheduler.probe_interval_hours))
                    .starting_after(Duration::from_secs(30)),
            ),
            (
                Arc::new(DailyReportJob(self.reporter.clone())),
                JobSchedule::every(hours(scheduler.report_interval_hours)),
            ),
            (
                Arc::new(ConformanceAuditJob(self.reporter.clone())),
                JobSchedule::every(hours(scheduler.audit_interval_hours)),
            ),
            (
                Arc::new(CacheMaintenanceJob(self.maintenance.clone())),
                JobSchedule::every(hours(scheduler.cache_interval_hours)).within(HourWindow {
                    start: scheduler.off_peak_start,
                    end: scheduler.off_peak_end,
                }),
            ),
        ]
    }
}

async fn handle_run(engine: &Engine, cmd: &RunCommand) -> anyhow::Result<()> {
    let retry = engine.retry_policy();
    let budget = engine.config.job_time_budget();
    let jobs = engine.jobs();

    if cmd.kick {
        info!("running every job once before scheduling");
        for (job, _) in &jobs {
            run_with_retry(job.as_ref(), retry, budget).await;
        }
    }

    let mut scheduler = Scheduler::new(engine.clock.clone(), budget);
    for (job, schedule) in jobs {
        scheduler.register(job, schedule, retry);
    }
    let handle = scheduler.start();

    println!("flitelog engine running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    handle.shutdown().await;
    Ok(())
}

async fn handle_sync(engine: &Engine, cmd: &SyncCommand) -> anyhow::Result<()> {
    if cmd.probe {
        let reachable = engine.sync.probe_connectivity().await?;
        println!(
            "regulator: {}",
            if reachable { "reachable" } else { "unreachable" }
        );
        return Ok(());
    }

    let summary = if cmd.reprocess {
        engine.sync.reprocess_failures(&engine.run_context()).await?
    } else {
        engine.sync.sync_pending(&engine.run_context()).await?
    };
    println!(
        "sync: {} processed, {} accepted, {} failed, {} quarantined, {} skipped",
        summary.processed, summary.succeeded, summary.failed, summary.quarantined, summary.skipped
    );
    Ok(())
}

async fn handle_sweep(engine: &Engine, cmd: &SweepCommand) -> anyhow::Result<()> {
    let summary = engine.sweep.sweep(&engine.run_context()).await?;
    println!(
        "sweep: {} overdue, {} newly escalated",
        summary.overdue, summary.escalated
    );

    if cmd.notify {
        let notified = engine
            .sweep
            .notify_near_deadline(&engine.run_context())
            .await?;
        println!("reminders: {notified} sent");
    }
    Ok(())
}

async fn handle_report(engine: &Engine, cmd: &ReportCommand) -> anyhow::Result<()> {
    let report = engine.reporter.daily_report(&engine.run_context()).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Compliance report for the 30 days since {}", report.window_start);
    println!("{:-<58}", "");
    println!(
        "{:<10} {:<6} {:>8} {:>10} {:>8}",
        "Tail", "Tier", "Records", "Complete", "Rate"
    );
    for entry in &report.fleet {
        println!(
            "{:<10} {:<6} {:>8} {:>10} {:>7.1}%",
            entry.registration, entry.class.code(), entry.total, entry.complete, entry.rate
        );
    }
    println!("{:-<58}", "");
    println!("Fleet completion: {:.1}%", report.overall_rate);
    if !report.escalated_records.is_empty() {
        println!(
            "Newly overdue records: {}",
            report
                .escalated_records
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

async fn handle_audit(engine: &Engine, cmd: &AuditCommand) -> anyhow::Result<()> {
    let report = engine
        .reporter
        .conformance_audit(&engine.run_context())
        .await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "conformance: {} sampled, {} passed, {} failed, score {:.1}%",
            report.sampled, report.passed, report.failed, report.score
        );
    }
    Ok(())
}

async fn handle_cache(engine: &Engine, cmd: &CacheCommand) -> anyhow::Result<()> {
    match cmd {
        CacheCommand::Stats { json } => {
            let stats = engine.maintenance.stats();
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "cache: {} entries, {} hits, {} misses ({:.1}% hit rate), {} payload bytes",
                    stats.keys,
                    stats.hits,
                    stats.misses,
                    stats.hit_rate(),
                    stats.payload_bytes
                );
            }
        }
        CacheCommand::Evict => {
            let summary = engine.maintenance.evict();
            println!(
                "evicted {} of {} scanned entries",
                summary.evicted, summary.scanned
            );
        }
        CacheCommand::Preheat => {
            let preheated = engine.maintenance.preheat().await?;
            println!("preheated {preheated} aircraft windows");
        }
        CacheCommand::Check => {
            let (checked, repaired) = engine.maintenance.check_integrity().await?;
            println!("checked {checked} entries, repaired {repaired}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  Audit log:          {}",
                    config
                        .storage
                        .audit_log_path
                        .as_ref()
                        .map_or_else(|| "structured log only".to_string(), |p| p.display().to_string())
                );
                println!();
                println!("[Scheduler]");
                println!(
                    "  Sweep interval:     {} min",
                    config.scheduler.sweep_interval_minutes
                );
                println!(
                    "  Sync interval:      {} min",
                    config.scheduler.sync_interval_minutes
                );
                println!(
                    "  Business hours:     {:02}:00-{:02}:00 UTC",
                    config.scheduler.business_hours_start, config.scheduler.business_hours_end
                );
                println!();
                println!("[Sync]");
                println!("  Max attempts:       {}", config.sync.max_attempts);
                println!(
                    "  Backoff tiers:      {:?} min",
                    config.sync.backoff_tiers_minutes
                );
                println!("  Submit timeout:     {} s", config.sync.submit_timeout_secs);
                println!();
                println!("[Regulator]");
                println!("  Mode:               {:?}", config.regulator.mode);
                println!("  Drop directory:     {}", config.drop_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
