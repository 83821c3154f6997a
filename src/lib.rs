pub mod calendar;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod response;
pub mod scheduler;
pub mod services;
pub mod test_utils;

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

pub use config::Config;

use clock::Clock;
use database::models::StagedSlot;
use database::repositories::{
    AttendanceRepository, ConfigurationRepository, EmployeeRepository, LeaveRepository,
    OvertimeRepository, QuotaRepository,
};
use database::stores::{
    AttendanceStore, ConfigStore, EmployeeStore, LeaveStore, OvertimeStore, QuotaStore,
};
use scheduler::{AttendanceCloser, ConfigRollover, LeaveCloser, OvertimeCloser, Scheduler};
use services::{
    AttendanceService, ClockInCodes, ConfigurationService, LeaveApprovalService,
    LeaveRequestService, NotificationService, OvertimeService, QuotaLedger,
};

/// One handle per persistence seam.
#[derive(Clone)]
pub struct Stores {
    pub quotas: Arc<dyn QuotaStore>,
    pub employees: Arc<dyn EmployeeStore>,
    pub leaves: Arc<dyn LeaveStore>,
    pub attendances: Arc<dyn AttendanceStore>,
    pub overtimes: Arc<dyn OvertimeStore>,
    pub configuration: Arc<dyn ConfigStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            quotas: Arc::new(QuotaRepository::new(pool.clone())),
            employees: Arc::new(EmployeeRepository::new(pool.clone())),
            leaves: Arc::new(LeaveRepository::new(pool.clone())),
            attendances: Arc::new(AttendanceRepository::new(pool.clone())),
            overtimes: Arc::new(OvertimeRepository::new(pool.clone())),
            configuration: Arc::new(ConfigurationRepository::new(pool)),
        }
    }

    /// Every seam backed by the same store, e.g. `test_utils::MemoryStore`.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: QuotaStore + EmployeeStore + LeaveStore + AttendanceStore + OvertimeStore + ConfigStore
            + 'static,
    {
        Self {
            quotas: store.clone(),
            employees: store.clone(),
            leaves: store.clone(),
            attendances: store.clone(),
            overtimes: store.clone(),
            configuration: store,
        }
    }
}

pub struct AppState {
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub quota_ledger: QuotaLedger,
    pub configuration: ConfigurationService,
    pub attendance: AttendanceService,
    pub overtime: OvertimeService,
    pub leave_requests: LeaveRequestService,
    pub leave_approval: LeaveApprovalService,
}

impl AppState {
    pub fn new(
        stores: Stores,
        notifications: NotificationService,
        codes: ClockInCodes,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quota_ledger = QuotaLedger::new(stores.quotas.clone());
        let configuration = ConfigurationService::new(stores.configuration.clone(), clock.clone());

        let overtime = OvertimeService::new(
            stores.overtimes.clone(),
            stores.attendances.clone(),
            stores.employees.clone(),
            configuration.clone(),
            notifications.clone(),
            clock.clone(),
        );

        let attendance = AttendanceService::new(
            stores.attendances.clone(),
            stores.employees.clone(),
            stores.leaves.clone(),
            overtime.clone(),
            configuration.clone(),
            notifications.clone(),
            codes,
            clock.clone(),
        );

        let leave_requests = LeaveRequestService::new(
            stores.leaves.clone(),
            stores.employees.clone(),
            quota_ledger.clone(),
            configuration.clone(),
            notifications.clone(),
            clock.clone(),
        );

        let leave_approval = LeaveApprovalService::new(
            stores.leaves.clone(),
            stores.employees.clone(),
            notifications,
            clock.clone(),
        );

        Self {
            stores,
            clock,
            quota_ledger,
            configuration,
            attendance,
            overtime,
            leave_requests,
            leave_approval,
        }
    }

    /// Registers every closer job on the schedules from `config`.
    pub fn scheduler(&self, config: &Config) -> Result<Scheduler> {
        let mut scheduler = Scheduler::new(self.clock.clone());

        scheduler.register(
            Arc::new(AttendanceCloser::new(
                self.stores.attendances.clone(),
                self.stores.employees.clone(),
                self.clock.clone(),
            )),
            &config.attendance_closer_cron,
        )?;
        scheduler.register(
            Arc::new(LeaveCloser::new(
                self.stores.leaves.clone(),
                self.clock.clone(),
                config.leave_closer_window_days,
            )),
            &config.leave_closer_cron,
        )?;
        scheduler.register(
            Arc::new(OvertimeCloser::new(
                self.stores.overtimes.clone(),
                self.clock.clone(),
            )),
            &config.overtime_closer_cron,
        )?;
        scheduler.register(
            Arc::new(ConfigRollover::new(
                self.configuration.clone(),
                StagedSlot::NextDay,
            )),
            &config.config_next_day_cron,
        )?;
        scheduler.register(
            Arc::new(ConfigRollover::new(
                self.configuration.clone(),
                StagedSlot::NextMonth,
            )),
            &config.config_next_month_cron,
        )?;

        Ok(scheduler)
    }
}
