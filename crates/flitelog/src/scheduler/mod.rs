//! Background job scheduler.
//!
//! Each registered job runs on its own tokio task with a fixed-period
//! interval; missed ticks are skipped rather than replayed, so a slow run
//! never causes a burst afterwards. A run that fails with a retryable
//! error is retried in place per the [`RetryPolicy`]; exhausted retries
//! are logged and the job waits for its next tick. A job failure never
//! takes the scheduler down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Timelike;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::Result;

/// Shared per-run state handed to each job.
pub struct RunContext {
    started: Instant,
    budget: Option<Duration>,
}

impl RunContext {
    /// Start a run with an optional time budget.
    #[must_use]
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Whether the run's time budget has elapsed. Jobs check this between
    /// records and end the run at the next safe boundary.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Time spent in this run so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("elapsed", &self.started.elapsed())
            .field("budget", &self.budget)
            .finish()
    }
}

/// A unit of scheduled work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// One run of the job.
    async fn run(&self, ctx: &RunContext) -> Result<()>;
}

/// In-place retry for a failed job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first run included.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Run at most once, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// A clock-hour window, `[start, end)` in UTC. `start > end` wraps past
/// midnight; `start == end` means always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    /// First hour, inclusive.
    pub start: u32,
    /// Last hour, exclusive.
    pub end: u32,
}

impl HourWindow {
    /// Whether `hour` falls inside the window.
    #[must_use]
    pub fn contains(&self, hour: u32) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// When and how often a job runs.
#[derive(Debug, Clone, Copy)]
pub struct JobSchedule {
    /// Period between runs.
    pub interval: Duration,
    /// Delay before the first run.
    pub initial_delay: Duration,
    /// Run only when the current UTC hour falls inside this window.
    pub window: Option<HourWindow>,
}

impl JobSchedule {
    /// Run every `interval`, starting one interval from now.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_delay: interval,
            window: None,
        }
    }

    /// Start the first run after `delay` instead of a full interval.
    #[must_use]
    pub fn starting_after(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Gate runs on an hour-of-day window.
    #[must_use]
    pub fn within(mut self, window: HourWindow) -> Self {
        self.window = Some(window);
        self
    }
}

struct Registration {
    job: Arc<dyn Job>,
    schedule: JobSchedule,
    retry: RetryPolicy,
}

/// Runs registered jobs until shutdown.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    budget: Option<Duration>,
    registrations: Vec<Registration>,
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, budget: Option<Duration>) -> Self {
        Self {
            clock,
            budget,
            registrations: Vec::new(),
        }
    }

    /// Register a job.
    pub fn register(&mut self, job: Arc<dyn Job>, schedule: JobSchedule, retry: RetryPolicy) {
        self.registrations.push(Registration {
            job,
            schedule,
            retry,
        });
    }

    /// Spawn every registered job and return a handle that stops them.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.registrations.len());

        for registration in self.registrations {
            info!(
                job = registration.job.name(),
                interval_secs = registration.schedule.interval.as_secs(),
                "scheduling job"
            );
            tasks.push(tokio::spawn(run_job_loop(
                registration,
                self.clock.clone(),
                self.budget,
                shutdown_rx.clone(),
            )));
        }

        SchedulerHandle { shutdown_tx, tasks }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.registrations.len())
            .field("budget", &self.budget)
            .finish()
    }
}

/// Handle over the running scheduler tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for every job task to finish its current
    /// run and exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "job task panicked");
                }
            }
        }
        info!("scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_job_loop(
    registration: Registration,
    clock: Arc<dyn Clock>,
    budget: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let Registration {
        job,
        schedule,
        retry,
    } = registration;

    let start = tokio::time::Instant::now() + schedule.initial_delay;
    let mut ticker = tokio::time::interval_at(start, schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                debug!(job = job.name(), "job loop shutting down");
                return;
            }
        }

        if let Some(window) = schedule.window {
            let hour = clock.now().time().hour();
            if !window.contains(hour) {
                debug!(job = job.name(), hour, "outside run window, skipping tick");
                continue;
            }
        }

        run_with_retry(job.as_ref(), retry, budget).await;
    }
}

/// Run one job tick, retrying retryable failures per the policy.
pub async fn run_with_retry(job: &dyn Job, retry: RetryPolicy, budget: Option<Duration>) {
    for attempt in 1..=retry.attempts.max(1) {
        let ctx = RunContext::new(budget);
        match job.run(&ctx).await {
            Ok(()) => {
                debug!(job = job.name(), attempt, elapsed = ?ctx.elapsed(), "job run finished");
                return;
            }
            Err(e) if e.is_retryable() && attempt < retry.attempts => {
                warn!(
                    job = job.name(),
                    attempt,
                    error = %e,
                    "job run failed, retrying"
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => {
                error!(job = job.name(), attempt, error = %e, "job run failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: AtomicU32,
        failures: Mutex<Vec<Error>>,
    }

    impl CountingJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                failures: Mutex::new(Vec::new()),
            })
        }

        fn failing_with(errors: Vec<Error>) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                failures: Mutex::new(errors),
            })
        }

        fn runs(&self) -> u32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _ctx: &RunContext) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut failures = self.failures.lock();
                if failures.is_empty() {
                    None
                } else {
                    Some(failures.remove(0))
                }
            };
            match next {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_hour_window_plain() {
        let window = HourWindow { start: 8, end: 18 };
        assert!(!window.contains(7));
        assert!(window.contains(8));
        assert!(window.contains(17));
        assert!(!window.contains(18));
    }

    #[test]
    fn test_hour_window_wraps_midnight() {
        let window = HourWindow { start: 22, end: 5 };
        assert!(window.contains(23));
        assert!(window.contains(0));
        assert!(window.contains(4));
        assert!(!window.contains(5));
        assert!(!window.contains(12));
    }

    #[test]
    fn test_hour_window_degenerate_means_always() {
        let window = HourWindow { start: 6, end: 6 };
        for hour in 0..24 {
            assert!(window.contains(hour));
        }
    }

    #[test]
    fn test_run_context_budget() {
        let ctx = RunContext::new(Some(Duration::ZERO));
        assert!(ctx.expired());

        let ctx = RunContext::new(Some(Duration::from_secs(600)));
        assert!(!ctx.expired());

        let ctx = RunContext::new(None);
        assert!(!ctx.expired());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let job = CountingJob::failing_with(vec![
            Error::transient("busy"),
            Error::transient("busy"),
        ]);
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        };

        run_with_retry(job.as_ref(), retry, None).await;
        assert_eq!(job.runs(), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable_error() {
        let job = CountingJob::failing_with(vec![
            Error::internal("broken"),
            Error::internal("broken"),
        ]);
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        };

        run_with_retry(job.as_ref(), retry, None).await;
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let job = CountingJob::failing_with(vec![
            Error::transient("busy"),
            Error::transient("busy"),
            Error::transient("busy"),
        ]);
        let retry = RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        };

        run_with_retry(job.as_ref(), retry, None).await;
        assert_eq!(job.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_job_on_interval() {
        let clock = Arc::new(crate::clock::SystemClock);
        let job = CountingJob::new();

        let mut scheduler = Scheduler::new(clock, None);
        scheduler.register(
            job.clone(),
            JobSchedule::every(Duration::from_secs(60)),
            RetryPolicy::none(),
        );
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(185)).await;
        handle.shutdown().await;

        assert_eq!(job.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_respects_initial_delay() {
        let clock = Arc::new(crate::clock::SystemClock);
        let job = CountingJob::new();

        let mut scheduler = Scheduler::new(clock, None);
        scheduler.register(
            job.clone(),
            JobSchedule::every(Duration::from_secs(600)).starting_after(Duration::from_secs(5)),
            RetryPolicy::none(),
        );
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_skips_ticks_outside_window() {
        // Manual clock pinned to 12:00 UTC; window only covers 02:00-05:00.
        let clock = Arc::new(crate::clock::ManualClock::at(
            chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2025, 6, 15, 12, 0, 0).unwrap(),
        ));
        let job = CountingJob::new();

        let mut scheduler = Scheduler::new(clock.clone(), None);
        scheduler.register(
            job.clone(),
            JobSchedule::every(Duration::from_secs(60))
                .within(HourWindow { start: 2, end: 5 }),
            RetryPolicy::none(),
        );
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(job.runs(), 0);

        // Move the clock into the window; subsequent ticks run.
        clock.set(chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2025, 6, 16, 3, 0, 0).unwrap());
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(job.runs() >= 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_failure_does_not_stop_scheduler() {
        let clock = Arc::new(crate::clock::SystemClock);
        let job = CountingJob::failing_with(vec![Error::internal("boom")]);

        let mut scheduler = Scheduler::new(clock, None);
        scheduler.register(
            job.clone(),
            JobSchedule::every(Duration::from_secs(60)),
            RetryPolicy::none(),
        );
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_secs(185)).await;
        handle.shutdown().await;

        // First run failed; later ticks still ran.
        assert_eq!(job.runs(), 3);
    }
}
