use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::calendar;
use crate::clock::Clock;
use crate::database::{
    models::{
        ConfigurationPolicy, Decision, Employee, HistoryScope, Overtime, OvertimeAction,
        OvertimeFilter, OvertimeHistoryQuery, OvertimeReport, Page,
    },
    stores::{AttendanceStore, EmployeeStore, OvertimeStore},
};
use crate::error::{AppError, AppResult};
use crate::services::configuration::ConfigurationService;
use crate::services::notification::{NotificationKind, NotificationService};
use crate::services::validation::{resolve_period, validate_reason};

pub const OVERTIME_REASON_MIN: usize = 10;
pub const OVERTIME_REASON_MAX: usize = 1000;

/// Accepted overtime for a session that started at `clock_in_at` and ends `now`.
///
/// Weekend sessions count entirely and are not capped. Weekday overtime is
/// capped by the daily limit and then by what is left of the weekly budget.
pub fn assess(
    clock_in_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &ConfigurationPolicy,
    weekly_sum: Duration,
    tz: Tz,
) -> OvertimeReport {
    let daily_cap = policy.max_overtime_daily();
    let weekly_cap = policy.max_overtime_weekly();
    let worked = (now - clock_in_at).max(Duration::zero());

    let mut report = OvertimeReport {
        overtime_weekly_total_duration: weekly_sum,
        max_allowed_daily_duration: daily_cap,
        max_allowed_weekly_duration: weekly_cap,
        is_overtime_available: weekly_sum < weekly_cap,
        ..Default::default()
    };

    if calendar::is_weekend(calendar::local_date(clock_in_at, tz)) {
        report.is_overtime = worked > Duration::zero();
        report.is_on_holiday = true;
        report.is_overtime_available = true;
        report.overtime_duration = worked;
        report.overtime_accepted_duration = worked;
        return report;
    }

    let office = policy.office_work_duration();
    if worked <= office {
        return report;
    }

    let overtime = worked - office;
    report.is_overtime = true;
    report.overtime_duration = overtime;

    let mut accepted = overtime.min(daily_cap);
    if overtime > daily_cap {
        report.is_overtime_leakage = true;
    }

    if weekly_sum >= weekly_cap {
        report.is_overtime_available = false;
        report.overtime_accepted_duration = Duration::zero();
        return report;
    }

    let remaining = weekly_cap - weekly_sum;
    if accepted > remaining {
        accepted = remaining;
        report.is_overtime_leakage = true;
    }

    report.overtime_accepted_duration = accepted;
    report
}

#[derive(Clone)]
pub struct OvertimeService {
    overtimes: Arc<dyn OvertimeStore>,
    attendances: Arc<dyn AttendanceStore>,
    employees: Arc<dyn EmployeeStore>,
    configuration: ConfigurationService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
}

impl OvertimeService {
    pub fn new(
        overtimes: Arc<dyn OvertimeStore>,
        attendances: Arc<dyn AttendanceStore>,
        employees: Arc<dyn EmployeeStore>,
        configuration: ConfigurationService,
        notifications: NotificationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            overtimes,
            attendances,
            employees,
            configuration,
            notifications,
            clock,
        }
    }

    /// Report for a session closing now. Managers and HR never accrue overtime.
    pub async fn report_for(
        &self,
        employee: &Employee,
        clock_in_at: DateTime<Utc>,
    ) -> AppResult<OvertimeReport> {
        if !employee.is_staff() {
            return Ok(OvertimeReport::default());
        }

        let policy = self.configuration.current().await?;
        let tz = self.clock.timezone();
        let now = self.clock.now();

        let (monday, sunday) = calendar::week_bounds(calendar::local_date(now, tz));
        let weekly_sum = self
            .attendances
            .weekly_overtime_sum(
                employee.id,
                calendar::start_of_day(monday, tz),
                calendar::end_of_day(sunday, tz),
            )
            .await?;

        Ok(assess(clock_in_at, now, &policy, weekly_sum, tz))
    }

    pub async fn incoming_for_manager(&self, manager_id: Uuid) -> AppResult<Vec<Overtime>> {
        Ok(self.overtimes.find_pending_for_manager(manager_id).await?)
    }

    async fn history(
        &self,
        scope: HistoryScope,
        settled_only: bool,
        query: &OvertimeHistoryQuery,
    ) -> AppResult<Page<Overtime>> {
        let filter = OvertimeFilter {
            scope,
            window: resolve_period(&query.period, self.clock.today(), self.clock.timezone())?,
            status: query.status,
            settled_only,
        };
        Ok(self.overtimes.history(&filter, &query.page).await?)
    }

    /// Overtime the employee submitted, in any state.
    pub async fn my_submissions(
        &self,
        employee_id: Uuid,
        query: &OvertimeHistoryQuery,
    ) -> AppResult<Page<Overtime>> {
        self.history(HistoryScope::Employee(employee_id), false, query)
            .await
    }

    /// Submissions the manager decided or that were auto-closed.
    pub async fn history_for_manager(
        &self,
        manager_id: Uuid,
        query: &OvertimeHistoryQuery,
    ) -> AppResult<Page<Overtime>> {
        self.history(HistoryScope::StaffOf(manager_id), true, query)
            .await
    }

    pub async fn history_for_hr(&self, query: &OvertimeHistoryQuery) -> AppResult<Page<Overtime>> {
        self.history(HistoryScope::All, false, query).await
    }

    pub async fn decide(&self, manager_id: Uuid, action: OvertimeAction) -> AppResult<Overtime> {
        let mut overtime = self
            .overtimes
            .find_by_id(action.overtime_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("overtime {}", action.overtime_id)))?;

        if overtime.manager_id != manager_id {
            return Err(AppError::Forbidden(
                "only the assigned manager can process this overtime".to_string(),
            ));
        }
        if overtime.closed_automatically.is_some() {
            return Err(AppError::domain(
                "Overtime",
                "overtime submission was closed automatically",
            ));
        }
        if !overtime.manager_decision.is_undecided() {
            return Err(AppError::domain("Overtime", "overtime was already processed"));
        }

        let now = self.clock.now();
        let decision = if action.approve {
            Decision::approved(now)
        } else {
            let reason = action.rejection_reason.unwrap_or_default();
            validate_reason(&reason, OVERTIME_REASON_MIN, OVERTIME_REASON_MAX)?;
            Decision::rejected(now, reason.trim())
        };

        if !self
            .overtimes
            .save_manager_decision(overtime.id, &decision)
            .await?
        {
            return Err(AppError::domain(
                "Overtime",
                "overtime was already processed or closed",
            ));
        }

        overtime.manager_decision = decision;
        log::info!(
            "Manager {} {} overtime {}",
            manager_id,
            if action.approve { "approved" } else { "rejected" },
            overtime.id
        );

        match self.employees.get_by_id(overtime.employee_id).await {
            Ok(Some(employee)) => {
                self.notifications
                    .notify(
                        NotificationKind::OvertimeDecided,
                        &employee,
                        serde_json::json!({
                            "overtimeId": overtime.id,
                            "approved": action.approve,
                        }),
                    )
                    .await;
            }
            Ok(None) => log::warn!(
                "Employee {} of overtime {} not found, decision not sent",
                overtime.employee_id,
                overtime.id
            ),
            Err(e) => log::error!(
                "Failed to load employee {} to notify overtime {}: {}",
                overtime.employee_id,
                overtime.id,
                e
            ),
        }

        Ok(overtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;

    fn tz() -> Tz {
        "Asia/Jakarta".parse().unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        calendar::at_time(
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            NaiveTime::from_hms_opt(h, min, 0).unwrap(),
            tz(),
        )
    }

    #[test]
    fn test_eleven_hour_day_accepts_two_hours() {
        let policy = ConfigurationPolicy::default();
        // Monday 2024-01-08, 08:00 to 19:00.
        let report = assess(at(2024, 1, 8, 8, 0), at(2024, 1, 8, 19, 0), &policy, Duration::zero(), tz());

        assert!(report.is_overtime);
        assert!(!report.is_overtime_leakage);
        assert_eq!(report.overtime_duration, Duration::hours(2));
        assert_eq!(report.overtime_accepted_duration, Duration::hours(2));
        assert!(report.should_create_record());
    }

    #[test]
    fn test_daily_cap_sets_leakage() {
        let policy = ConfigurationPolicy::default();
        let report = assess(at(2024, 1, 8, 7, 0), at(2024, 1, 8, 21, 0), &policy, Duration::zero(), tz());

        assert_eq!(report.overtime_duration, Duration::hours(5));
        assert_eq!(report.overtime_accepted_duration, Duration::hours(3));
        assert!(report.is_overtime_leakage);
    }

    #[test]
    fn test_weekly_budget_caps_acceptance() {
        let policy = ConfigurationPolicy::default();
        let report = assess(
            at(2024, 1, 10, 8, 0),
            at(2024, 1, 10, 20, 0),
            &policy,
            Duration::hours(13),
            tz(),
        );

        assert_eq!(report.overtime_accepted_duration, Duration::hours(1));
        assert!(report.is_overtime_leakage);
        assert!(report.is_overtime_available);
    }

    #[test]
    fn test_exhausted_week_accepts_nothing() {
        let policy = ConfigurationPolicy::default();
        let report = assess(
            at(2024, 1, 10, 8, 0),
            at(2024, 1, 10, 20, 0),
            &policy,
            Duration::hours(14),
            tz(),
        );

        assert!(!report.is_overtime_available);
        assert_eq!(report.overtime_accepted_duration, Duration::zero());
        assert!(!report.should_create_record());
    }

    #[test]
    fn test_weekend_counts_everything() {
        let policy = ConfigurationPolicy::default();
        // Saturday 2024-01-13.
        let report = assess(
            at(2024, 1, 13, 9, 0),
            at(2024, 1, 13, 15, 30),
            &policy,
            Duration::hours(14),
            tz(),
        );

        assert!(report.is_on_holiday);
        assert_eq!(report.overtime_accepted_duration, Duration::minutes(390));
        assert!(report.should_create_record());
    }

    #[test]
    fn test_short_day_has_no_overtime() {
        let policy = ConfigurationPolicy::default();
        let report = assess(at(2024, 1, 8, 8, 0), at(2024, 1, 8, 16, 0), &policy, Duration::zero(), tz());

        assert!(!report.is_overtime);
        assert_eq!(report.overtime_accepted_duration, Duration::zero());
    }

    #[test]
    fn test_accepted_never_exceeds_caps() {
        let policy = ConfigurationPolicy::default();
        for prior in 0..=16 {
            for end_hour in 17..=23 {
                let prior = Duration::hours(prior);
                let report = assess(
                    at(2024, 1, 9, 8, 0),
                    at(2024, 1, 9, end_hour, 0),
                    &policy,
                    prior,
                    tz(),
                );
                let remaining = (policy.max_overtime_weekly() - prior).max(Duration::zero());
                let bound = policy.max_overtime_daily().min(remaining);
                assert!(report.overtime_accepted_duration <= bound);
            }
        }
    }
}
