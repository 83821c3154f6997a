use std::sync::Arc;

use async_trait::async_trait;
use chrono::Days;

use crate::clock::Clock;
use crate::database::{
    models::{AutoClosure, StagedSlot},
    stores::{AttendanceStore, EmployeeStore, LeaveStore, OvertimeStore},
};
use crate::error::AppResult;
use crate::services::configuration::ConfigurationService;

pub const ATTENDANCE_CLOSED_REASON: &str =
    "This attendance was closed automatically because it was still open at the end of the working day.";
pub const LEAVE_CLOSED_REASON: &str = "This leave request was closed because it had not finished processing 3 days before the start of request's date.";
pub const OVERTIME_CLOSED_REASON: &str =
    "This overtime submission is closed because it was not processed until 24th of the month.";

/// Counts of one closer run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl JobReport {
    /// Tallies one record: closed, lost its guard, or failed.
    fn record<E: std::fmt::Display>(&mut self, job: &str, id: impl std::fmt::Display, outcome: Result<bool, E>) {
        match outcome {
            Ok(true) => self.processed += 1,
            Ok(false) => {
                log::debug!("{}: {} was already resolved, skipping", job, id);
                self.skipped += 1;
            }
            Err(e) => {
                log::error!("{}: failed to close {}: {}", job, id, e);
                self.failed += 1;
            }
        }
    }
}

/// A deadline-driven job that force-resolves records nobody acted on.
///
/// Each record is written in its own transaction and every write is guarded,
/// so running a job twice over the same data changes nothing the second time.
#[async_trait]
pub trait CloserJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> AppResult<JobReport>;
}

pub struct AttendanceCloser {
    attendances: Arc<dyn AttendanceStore>,
    employees: Arc<dyn EmployeeStore>,
    clock: Arc<dyn Clock>,
}

impl AttendanceCloser {
    pub fn new(
        attendances: Arc<dyn AttendanceStore>,
        employees: Arc<dyn EmployeeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendances,
            employees,
            clock,
        }
    }
}

#[async_trait]
impl CloserJob for AttendanceCloser {
    fn name(&self) -> &'static str {
        "attendance-closer"
    }

    async fn run(&self) -> AppResult<JobReport> {
        let mut report = JobReport::default();
        let closure = AutoClosure {
            at: self.clock.now(),
            reason: ATTENDANCE_CLOSED_REASON.to_string(),
        };

        for attendance in self.attendances.find_open().await? {
            let outcome = self
                .attendances
                .close_automatically(attendance.id, &closure)
                .await;
            report.record(self.name(), attendance.id, outcome);
        }

        match self.employees.reset_available().await {
            Ok(count) => log::debug!("{}: marked {} employee(s) unavailable", self.name(), count),
            Err(e) => log::error!("{}: failed to reset employee status: {}", self.name(), e),
        }

        Ok(report)
    }
}

pub struct LeaveCloser {
    leaves: Arc<dyn LeaveStore>,
    clock: Arc<dyn Clock>,
    window_days: u64,
}

impl LeaveCloser {
    pub fn new(leaves: Arc<dyn LeaveStore>, clock: Arc<dyn Clock>, window_days: i64) -> Self {
        Self {
            leaves,
            clock,
            window_days: window_days.max(0) as u64,
        }
    }
}

#[async_trait]
impl CloserJob for LeaveCloser {
    fn name(&self) -> &'static str {
        "leave-closer"
    }

    async fn run(&self) -> AppResult<JobReport> {
        let mut report = JobReport::default();
        let today = self.clock.today();
        let until = today
            .checked_add_days(Days::new(self.window_days))
            .unwrap_or(today);
        let closure = AutoClosure {
            at: self.clock.now(),
            reason: LEAVE_CLOSED_REASON.to_string(),
        };

        for root in self.leaves.find_due_for_closing(until).await? {
            let outcome = self.leaves.close_automatically(root.id, &closure).await;
            report.record(self.name(), root.id, outcome);
        }

        Ok(report)
    }
}

pub struct OvertimeCloser {
    overtimes: Arc<dyn OvertimeStore>,
    clock: Arc<dyn Clock>,
}

impl OvertimeCloser {
    pub fn new(overtimes: Arc<dyn OvertimeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { overtimes, clock }
    }
}

#[async_trait]
impl CloserJob for OvertimeCloser {
    fn name(&self) -> &'static str {
        "overtime-closer"
    }

    async fn run(&self) -> AppResult<JobReport> {
        let mut report = JobReport::default();
        let closure = AutoClosure {
            at: self.clock.now(),
            reason: OVERTIME_CLOSED_REASON.to_string(),
        };

        for overtime in self.overtimes.find_undecided().await? {
            let outcome = self
                .overtimes
                .close_automatically(overtime.id, &closure)
                .await;
            report.record(self.name(), overtime.id, outcome);
        }

        Ok(report)
    }
}

/// Applies one staged configuration slot.
pub struct ConfigRollover {
    configuration: ConfigurationService,
    slot: StagedSlot,
}

impl ConfigRollover {
    pub fn new(configuration: ConfigurationService, slot: StagedSlot) -> Self {
        Self {
            configuration,
            slot,
        }
    }
}

#[async_trait]
impl CloserJob for ConfigRollover {
    fn name(&self) -> &'static str {
        match self.slot {
            StagedSlot::NextDay => "config-next-day",
            StagedSlot::NextMonth => "config-next-month",
        }
    }

    async fn run(&self) -> AppResult<JobReport> {
        let mut report = JobReport::default();
        let outcome = self.configuration.apply_staged(self.slot).await;
        report.record(self.name(), self.slot, outcome);
        Ok(report)
    }
}
