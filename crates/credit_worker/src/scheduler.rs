//! Periodic task runner
//!
//! Each [`ScheduledTask`] gets its own tokio task that sleeps until the next
//! due instant, runs one job, and repeats until the shared shutdown signal
//! fires. Tasks never share state; a failing job is logged and retried at
//! its next slot.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use core_kernel::{Clock, TemporalError, Timezone};
use credit_engine::EngineError;

use crate::error::WorkerError;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;

type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// When a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed delay between the end of one run and the start of the next
    Every(Duration),
    /// Once a day at a local time
    Daily(NaiveTime),
    /// Once a week on a weekday at a local time
    Weekly(Weekday, NaiveTime),
}

impl Schedule {
    /// How long to wait from `now` until the next run
    pub fn delay_from(
        &self,
        timezone: &Timezone,
        now: DateTime<Utc>,
    ) -> Result<Duration, TemporalError> {
        let next = match *self {
            Schedule::Every(interval) => return Ok(interval),
            Schedule::Daily(at) => timezone.next_daily(now, at)?,
            Schedule::Weekly(day, at) => timezone.next_weekly(now, day, at)?,
        };
        Ok((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// A named job bound to a schedule
#[derive(Clone)]
pub struct ScheduledTask {
    name: &'static str,
    schedule: Schedule,
    job: Job,
}

impl ScheduledTask {
    pub fn new<F, Fut>(name: &'static str, schedule: Schedule, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        Self {
            name,
            schedule,
            job: Arc::new(move || Box::pin(job()) as JobFuture),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Runs the job once, outside any schedule
    pub async fn run_once(&self) -> Result<(), EngineError> {
        (self.job)().await
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// Owns the task list until [`Scheduler::start`] hands it to the runtime
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    timezone: Timezone,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(tasks: Vec<ScheduledTask>, timezone: Timezone, clock: Arc<dyn Clock>) -> Self {
        Self { tasks, timezone, clock }
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(ScheduledTask::name).collect()
    }

    /// Spawns one tokio task per scheduled task
    ///
    /// # Errors
    ///
    /// Fails before spawning anything if some task's first run cannot be
    /// computed.
    pub fn start(self) -> Result<SchedulerHandle, WorkerError> {
        let now = self.clock.now();
        for task in &self.tasks {
            let delay = task
                .schedule
                .delay_from(&self.timezone, now)
                .map_err(|source| WorkerError::Schedule { task: task.name, source })?;
            tracing::info!(
                task = task.name,
                schedule = ?task.schedule,
                first_run_in_secs = delay.as_secs(),
                "scheduler.task_registered"
            );
        }

        let (shutdown, _) = watch::channel(false);
        let handles = self
            .tasks
            .into_iter()
            .map(|task| {
                let receiver = shutdown.subscribe();
                tokio::spawn(run_task(task, self.timezone, self.clock.clone(), receiver))
            })
            .collect();

        Ok(SchedulerHandle { shutdown, handles })
    }
}

/// Running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn running_tasks(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Signals every task and waits for them to stop
    ///
    /// A job already running finishes first; sleeping tasks stop at once.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scheduler.task_panicked");
            }
        }
        tracing::info!("scheduler.stopped");
    }
}

async fn run_task(
    task: ScheduledTask,
    timezone: Timezone,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let delay = match task.schedule.delay_from(&timezone, clock.now()) {
            Ok(delay) => delay,
            Err(e) => {
                tracing::error!(task = task.name, error = %e, "scheduler.next_run_failed");
                break;
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        let started = Instant::now();
        match task.run_once().await {
            Ok(()) => tracing::info!(
                task = task.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scheduler.task_completed"
            ),
            Err(e) => tracing::error!(
                task = task.name,
                kind = ?e.kind(),
                error = %e,
                "scheduler.task_failed"
            ),
        }
    }
    tracing::debug!(task = task.name, "scheduler.task_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn counting_task(schedule: Schedule, runs: Arc<AtomicUsize>) -> ScheduledTask {
        ScheduledTask::new("count", schedule, move || {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    mod schedule {
        use super::*;

        #[test]
        fn test_every_ignores_the_clock() {
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
            let delay = Schedule::Every(Duration::from_secs(900))
                .delay_from(&Timezone::default(), now)
                .unwrap();
            assert_eq!(delay, Duration::from_secs(900));
        }

        #[test]
        fn test_daily_waits_until_next_occurrence() {
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 8, 30, 0).unwrap();
            let delay = Schedule::Daily(at(9, 0)).delay_from(&Timezone::default(), now).unwrap();
            assert_eq!(delay, Duration::from_secs(30 * 60));
        }

        #[test]
        fn test_daily_rolls_over_once_passed() {
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
            let delay = Schedule::Daily(at(9, 0)).delay_from(&Timezone::default(), now).unwrap();
            assert_eq!(delay, Duration::from_secs(24 * 3600));
        }

        #[test]
        fn test_weekly_lands_on_sunday() {
            // 2025-01-01 is a Wednesday
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let delay = Schedule::Weekly(Weekday::Sun, at(2, 0))
                .delay_from(&Timezone::default(), now)
                .unwrap();
            assert_eq!(delay, Duration::from_secs((4 * 24 + 2) * 3600));
        }
    }

    mod runner {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_interval_task_runs_until_shutdown() {
            let runs = Arc::new(AtomicUsize::new(0));
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let scheduler = Scheduler::new(
                vec![counting_task(Schedule::Every(Duration::from_secs(60)), runs.clone())],
                Timezone::default(),
                clock,
            );

            let handle = scheduler.start().unwrap();
            assert_eq!(handle.running_tasks(), 1);

            tokio::time::sleep(Duration::from_secs(150)).await;
            assert_eq!(runs.load(Ordering::SeqCst), 2);

            handle.shutdown().await;
            tokio::time::sleep(Duration::from_secs(600)).await;
            assert_eq!(runs.load(Ordering::SeqCst), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failing_job_keeps_its_slot() {
            let attempts = Arc::new(AtomicUsize::new(0));
            let counter = attempts.clone();
            let every = Schedule::Every(Duration::from_secs(10));
            let task = ScheduledTask::new("fails", every, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Storage("database unavailable".into()))
                }
            });
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let handle = Scheduler::new(vec![task], Timezone::default(), clock).start().unwrap();

            tokio::time::sleep(Duration::from_secs(35)).await;
            assert_eq!(attempts.load(Ordering::SeqCst), 3);
            handle.shutdown().await;
        }

        #[tokio::test]
        async fn test_shutdown_stops_sleeping_daily_task() {
            let runs = Arc::new(AtomicUsize::new(0));
            let midnight = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let clock = Arc::new(ManualClock::new(midnight));
            let handle = Scheduler::new(
                vec![counting_task(Schedule::Daily(at(23, 0)), runs.clone())],
                Timezone::default(),
                clock,
            )
            .start()
            .unwrap();

            handle.shutdown().await;
            assert_eq!(runs.load(Ordering::SeqCst), 0);
        }
    }
}
