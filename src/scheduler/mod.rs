//! Cron-driven runner for the closer jobs.
//!
//! Each registered job gets its own task that sleeps until the next fire time
//! of its schedule, evaluated in the company's time zone. Jobs never run
//! concurrently with themselves.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};

pub mod jobs;

pub use jobs::{
    AttendanceCloser, CloserJob, ConfigRollover, JobReport, LeaveCloser, OvertimeCloser,
};

struct ScheduledJob {
    job: Arc<dyn CloserJob>,
    schedule: Schedule,
}

pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Next time `schedule` fires strictly after `now`, seen from `tz`.
pub fn next_fire(schedule: &Schedule, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    schedule
        .after(&now.with_timezone(&tz))
        .next()
        .map(|next| next.with_timezone(&Utc))
}

async fn run_logged(job: &dyn CloserJob) -> AppResult<JobReport> {
    log::info!("Running job {}", job.name());
    let result = job.run().await;
    match &result {
        Ok(report) => log::info!(
            "Job {} finished: {} processed, {} skipped, {} failed",
            job.name(),
            report.processed,
            report.skipped,
            report.failed
        ),
        Err(e) => log::error!("Job {} failed: {}", job.name(), e),
    }
    result
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            clock,
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn CloserJob>, expression: &str) -> Result<()> {
        let schedule = Schedule::from_str(expression)
            .with_context(|| format!("Invalid schedule for {}: {}", job.name(), expression))?;
        log::debug!("Registered job {} on '{}'", job.name(), expression);
        self.jobs.push(ScheduledJob { job, schedule });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.job.name()).collect()
    }

    /// Spawns one task per job. Calling it again while running does nothing.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            log::warn!("Scheduler already started");
            return;
        }

        for scheduled in &self.jobs {
            let job = Arc::clone(&scheduled.job);
            let schedule = scheduled.schedule.clone();
            let clock = Arc::clone(&self.clock);
            let mut stop = self.shutdown.subscribe();

            self.handles.push(tokio::spawn(async move {
                loop {
                    let now = clock.now();
                    let Some(next) = next_fire(&schedule, now, clock.timezone()) else {
                        log::warn!("Job {} has no upcoming fire time", job.name());
                        break;
                    };
                    let wait = (next - now).to_std().unwrap_or_default();
                    log::debug!("Job {} next runs at {}", job.name(), next);

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            let _ = run_logged(job.as_ref()).await;
                        }
                        changed = stop.changed() => {
                            if changed.is_err() || *stop.borrow() {
                                break;
                            }
                        }
                    }
                }
                log::debug!("Job {} stopped", job.name());
            }));
        }

        log::info!("Scheduler started with {} job(s)", self.handles.len());
    }

    /// Runs a registered job once, outside its schedule.
    pub async fn run_now(&self, name: &str) -> AppResult<JobReport> {
        let scheduled = self
            .jobs
            .iter()
            .find(|j| j.job.name() == name)
            .ok_or_else(|| AppError::NotFound(format!("job {}", name)))?;
        run_logged(scheduled.job.as_ref()).await
    }

    /// Signals every job task and waits for them to finish their current run.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                log::error!("Scheduler task failed: {}", e);
            }
        }
        log::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    use crate::calendar;

    #[test]
    fn test_next_fire_uses_company_zone() {
        let tz: Tz = "Asia/Jakarta".parse().unwrap();
        let schedule = Schedule::from_str("0 0 21 * * *").unwrap();
        let now = calendar::at_time(
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            tz,
        );

        let next = next_fire(&schedule, now, tz).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-01-08T14:00:00+00:00");
    }

    #[test]
    fn test_monthly_schedule_fires_on_the_24th() {
        let tz: Tz = "Asia/Jakarta".parse().unwrap();
        let schedule = Schedule::from_str("0 0 0 24 * *").unwrap();
        let now = calendar::at_time(
            NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(),
            NaiveTime::MIN,
            tz,
        );

        let next = next_fire(&schedule, now, tz).unwrap();
        assert_eq!(
            calendar::local_date(next, tz),
            NaiveDate::from_ymd_opt(2024, 2, 24).unwrap()
        );
    }
}
