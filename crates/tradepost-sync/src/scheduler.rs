//! # Scheduler
//!
//! Background loop running the inventory stage once a day at a configured
//! local wall-clock time.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──► next_target(max(now, last), HH:MM) ──► sleep ──cancel──► exit   │
//! │   │                               │                                     │
//! │   │                               ▼                                     │
//! │   │                      cancelled? ──yes──► exit (no partial run)      │
//! │   │                               │ no                                  │
//! │   │                               ▼                                     │
//! │   │                     job.run_scheduled(cancel)                       │
//! │   │                         │            │                              │
//! │   │                        Ok           Err                             │
//! │   │                         │            ▼                              │
//! │   │                         │     sleep(cooldown) ──cancel──► exit     │
//! │   └─────────────────────────┴────────────┘                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each target fires at most once. The wall clock and tokio's timer can
//! disagree by a few milliseconds; waking just before the target must not
//! schedule the same target again.

use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SchedulerSettings;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use tradepost_core::validation::parse_daily_time;
use tradepost_core::{SyncRequest, SyncTrigger};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Work the scheduler invokes on each tick.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run_scheduled(&self, cancel: &CancellationToken) -> SyncResult<()>;
}

#[async_trait]
impl ScheduledJob for SyncOrchestrator {
    async fn run_scheduled(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let report = self
            .sync(SyncRequest::inventory_only(), SyncTrigger::Scheduled, cancel)
            .await?;

        if let Some(message) = &report.error_message {
            warn!(run_id = %report.run_id, error = %message, "Scheduled sync finished with errors");
        }
        Ok(())
    }
}

/// The first occurrence of `at` strictly after `after`.
///
/// A local time that does not exist on a given day (DST gap) moves the run
/// to the following day.
pub fn next_target<Tz: TimeZone>(after: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let today = after.date_naive();

    (0..=2)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .find(|candidate| candidate > after)
}

/// Time from `now` until `target`, zero if it already passed.
fn until<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> Duration {
    target
        .clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Time until the next occurrence of `at` strictly after `now`.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    next_target(now, at)
        .map(|target| until(now, &target))
        .unwrap_or(ONE_DAY)
}

type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub struct Scheduler {
    job: Arc<dyn ScheduledJob>,
    daily_at: NaiveTime,
    cooldown: Duration,
    clock: Clock,
}

impl Scheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, daily_at: NaiveTime, cooldown: Duration) -> Self {
        Scheduler {
            job,
            daily_at,
            cooldown,
            clock: Arc::new(Local::now),
        }
    }

    pub fn from_settings(job: Arc<dyn ScheduledJob>, settings: &SchedulerSettings) -> SyncResult<Self> {
        let daily_at = parse_daily_time(&settings.daily_at)
            .map_err(|e| SyncError::InvalidConfig(format!("scheduler.daily_at: {}", e)))?;
        Ok(Self::new(job, daily_at, settings.error_cooldown()))
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Loops until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(daily_at = %self.daily_at.format("%H:%M"), "Scheduler started");

        let mut last_target: Option<DateTime<Local>> = None;

        loop {
            let now = (self.clock)();
            let after = match &last_target {
                Some(last) if *last > now => last.clone(),
                _ => now.clone(),
            };
            let target = next_target(&after, self.daily_at);
            let delay = target.as_ref().map(|t| until(&now, t)).unwrap_or(ONE_DAY);
            info!(in_secs = delay.as_secs(), "Next scheduled sync");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            last_target = target;

            match self.job.run_scheduled(&cancel).await {
                Ok(()) => info!("Scheduled sync completed"),
                Err(e) => {
                    warn!(
                        error = %e,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Scheduled sync failed, cooling down"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.cooldown) => {}
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingJob {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(CountingJob {
                runs: AtomicUsize::new(0),
                fail,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        async fn run_scheduled(&self, _cancel: &CancellationToken) -> SyncResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SyncError::Internal("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn at(hh: u32, mm: u32, ss: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hh, mm, ss).unwrap()
    }

    fn noon() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 1, 5, 12, 0, 0)
            .earliest()
            .unwrap()
    }

    /// Wall clock starting at noon and advancing with tokio's timer.
    fn clock_from_noon() -> impl Fn() -> DateTime<Local> + Send + Sync + 'static {
        let start = tokio::time::Instant::now();
        let base = noon();
        move || base + chrono::Duration::from_std(start.elapsed()).unwrap()
    }

    fn spawn(scheduler: Scheduler, cancel: &CancellationToken) -> tokio::task::JoinHandle<()> {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    #[test]
    fn test_next_run_same_day_and_rollover() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(next_run(&now, at(3, 0, 0)), Duration::from_secs(3600));
        assert_eq!(next_run(&now, at(1, 0, 0)), Duration::from_secs(23 * 3600));

        // Exactly on time schedules tomorrow, not now.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(next_run(&now, at(3, 0, 0)), ONE_DAY);
    }

    #[test]
    fn test_next_run_uses_local_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 01:30 UTC is 03:30 at +02:00, so 03:00 local already passed.
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 1, 30, 0)
            .unwrap()
            .with_timezone(&tz);
        assert_eq!(
            next_run(&now, at(3, 0, 0)),
            Duration::from_secs(23 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn test_next_target_is_strictly_after() {
        let at_three = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        let target = next_target(&at_three, at(3, 0, 0)).unwrap();
        assert_eq!(target, Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_once_per_day() {
        let job = CountingJob::new(false);
        let scheduler = Scheduler::new(job.clone(), at(12, 0, 30), Duration::from_secs(300))
            .with_clock(clock_from_noon());
        let cancel = CancellationToken::new();
        let handle = spawn(scheduler, &cancel);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(job.runs(), 1);
        tokio::time::sleep(ONE_DAY).await;
        assert_eq!(job.runs(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_wall_clock_fires_target_once() {
        // The wall clock never moves past noon while the timer keeps going.
        let job = CountingJob::new(false);
        let scheduler = Scheduler::new(job.clone(), at(12, 0, 30), Duration::from_secs(300))
            .with_clock(noon);
        let cancel = CancellationToken::new();
        let handle = spawn(scheduler, &cancel);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(job.runs(), 1);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(job.runs(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cools_down_then_keeps_schedule() {
        let job = CountingJob::new(true);
        let scheduler = Scheduler::new(job.clone(), at(12, 0, 30), Duration::from_secs(300))
            .with_clock(clock_from_noon());
        let cancel = CancellationToken::new();
        let handle = spawn(scheduler, &cancel);

        // Failed at 30s, cooling down until 330s.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(job.runs(), 1);
        tokio::time::sleep(ONE_DAY).await;
        assert_eq!(job.runs(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_cooldown() {
        let job = CountingJob::new(true);
        let scheduler = Scheduler::new(job.clone(), at(12, 0, 30), Duration::from_secs(300))
            .with_clock(clock_from_noon());
        let cancel = CancellationToken::new();
        let handle = spawn(scheduler, &cancel);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs(), 1);
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let job = CountingJob::new(false);
        let scheduler = Scheduler::new(job.clone(), at(3, 0, 0), Duration::from_secs(300));
        let cancel = CancellationToken::new();
        let handle = spawn(scheduler, &cancel);

        tokio::task::yield_now().await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(job.runs(), 0);
    }

    #[test]
    fn test_rejects_bad_daily_time() {
        let settings = SchedulerSettings {
            daily_at: "25:99".into(),
            ..Default::default()
        };
        let result = Scheduler::from_settings(CountingJob::new(false), &settings);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }
}
