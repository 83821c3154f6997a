use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calendar;
use crate::clock::Clock;
use crate::database::{
    models::{
        Attendance, AttendanceFilter, AttendanceHistoryQuery, ClockInRequest, ClockOutRequest,
        ConfigurationPolicy, Decision, Employee, EmployeeStatus, GeoPoint, HistoryScope, Overtime,
        OvertimeReport, Page,
    },
    stores::{AttendanceStore, EmployeeStore, LeaveStore},
};
use crate::error::{AppError, AppResult};
use crate::services::clock_in_codes::ClockInCodes;
use crate::services::configuration::ConfigurationService;
use crate::services::notification::{NotificationKind, NotificationService};
use crate::services::overtime::{OVERTIME_REASON_MAX, OVERTIME_REASON_MIN, OvertimeService};
use crate::services::validation::{ensure_staff_of, resolve_period, validate_reason};

/// Furthest a clock-out may be from where the session started.
pub const MAX_CLOCK_OUT_DISTANCE_METERS: f64 = 5_000.0;

#[derive(Clone)]
pub struct AttendanceService {
    attendances: Arc<dyn AttendanceStore>,
    employees: Arc<dyn EmployeeStore>,
    leaves: Arc<dyn LeaveStore>,
    overtime: OvertimeService,
    configuration: ConfigurationService,
    notifications: NotificationService,
    codes: ClockInCodes,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attendances: Arc<dyn AttendanceStore>,
        employees: Arc<dyn EmployeeStore>,
        leaves: Arc<dyn LeaveStore>,
        overtime: OvertimeService,
        configuration: ConfigurationService,
        notifications: NotificationService,
        codes: ClockInCodes,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendances,
            employees,
            leaves,
            overtime,
            configuration,
            notifications,
            codes,
            clock,
        }
    }

    async fn employee(&self, employee_id: Uuid) -> AppResult<Employee> {
        self.employees
            .get_by_id(employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("employee {}", employee_id)))
    }

    pub async fn todays_attendance(&self, employee_id: Uuid) -> AppResult<Option<Attendance>> {
        let today = self.clock.today();
        let tz = self.clock.timezone();
        Ok(self
            .attendances
            .find_in_range(
                employee_id,
                calendar::start_of_day(today, tz),
                calendar::end_of_day(today, tz),
            )
            .await?)
    }

    async fn history(
        &self,
        scope: HistoryScope,
        query: &AttendanceHistoryQuery,
    ) -> AppResult<Page<Attendance>> {
        let filter = AttendanceFilter {
            scope,
            window: resolve_period(&query.period, self.clock.today(), self.clock.timezone())?,
            late_only: query.late_clock_in,
            early_only: query.early_clock_out,
            closed_only: query.closed,
        };
        Ok(self.attendances.history(&filter, &query.page).await?)
    }

    /// Finished sessions of the employee, newest first.
    pub async fn attendance_history(
        &self,
        employee_id: Uuid,
        query: &AttendanceHistoryQuery,
    ) -> AppResult<Page<Attendance>> {
        self.history(HistoryScope::Employee(employee_id), query).await
    }

    /// Finished sessions of everyone reporting to the manager.
    pub async fn staff_attendance_history(
        &self,
        manager_id: Uuid,
        query: &AttendanceHistoryQuery,
    ) -> AppResult<Page<Attendance>> {
        self.history(HistoryScope::StaffOf(manager_id), query).await
    }

    pub async fn staff_member_attendance_history(
        &self,
        manager_id: Uuid,
        employee_id: Uuid,
        query: &AttendanceHistoryQuery,
    ) -> AppResult<Page<Attendance>> {
        let employee = self.employee(employee_id).await?;
        ensure_staff_of(&employee, manager_id)?;
        self.history(HistoryScope::Employee(employee_id), query).await
    }

    /// Finished sessions of every employee, for HR.
    pub async fn all_attendance_history(
        &self,
        query: &AttendanceHistoryQuery,
    ) -> AppResult<Page<Attendance>> {
        self.history(HistoryScope::All, query).await
    }

    /// Checks shared by both clock-in steps; returns the clock-in deadline.
    async fn ensure_can_clock_in(
        &self,
        employee: &Employee,
        policy: &ConfigurationPolicy,
    ) -> AppResult<DateTime<Utc>> {
        let now = self.clock.now();
        let today = self.clock.today();
        let tz = self.clock.timezone();

        if self.todays_attendance(employee.id).await?.is_some() {
            return Err(AppError::domain("Attendance", "employee already clocked in today"));
        }
        if self.attendances.find_active(employee.id).await?.is_some() {
            return Err(AppError::domain(
                "Attendance",
                "employee still has an active attendance",
            ));
        }
        if employee.status == EmployeeStatus::OnLeave
            || self.leaves.employee_on_leave(employee.id, today).await?
        {
            return Err(AppError::domain("Attendance", "employee is on leave today"));
        }

        let deadline = policy.office_end_on(today, tz) - policy.acceptance_interval();
        if now > deadline {
            return Err(AppError::domain(
                "Attendance",
                "clock-in is no longer accepted for today",
            ));
        }

        Ok(deadline)
    }

    /// Issues a one-time code valid until the clock-in deadline and mails it.
    pub async fn request_clock_in(&self, employee_id: Uuid) -> AppResult<DateTime<Utc>> {
        let employee = self.employee(employee_id).await?;
        let policy = self.configuration.current().await?;
        let deadline = self.ensure_can_clock_in(&employee, &policy).await?;

        let ttl = (deadline - self.clock.now())
            .to_std()
            .map_err(|_| AppError::domain("Attendance", "clock-in is no longer accepted for today"))?;
        let code = self.codes.issue(employee.id, ttl).await;

        self.notifications
            .mail(
                NotificationKind::ClockInCode,
                &employee,
                serde_json::json!({
                    "name": employee.first_name(),
                    "code": code,
                    "expiresAt": deadline,
                }),
            )
            .await;

        log::info!("Issued clock-in code for employee {}", employee.id);
        Ok(deadline)
    }

    pub async fn clock_in(&self, employee_id: Uuid, request: ClockInRequest) -> AppResult<Attendance> {
        let employee = self.employee(employee_id).await?;
        let policy = self.configuration.current().await?;
        self.ensure_can_clock_in(&employee, &policy).await?;

        if !request.location.is_valid() {
            return Err(AppError::BadRequest("invalid clock-in location".to_string()));
        }
        if !self.codes.consume(employee.id, &request.code).await {
            return Err(AppError::domain("Attendance", "invalid or expired clock-in code"));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let tz = self.clock.timezone();
        let late_after = policy.office_start_on(today, tz) + policy.acceptance_interval();

        let attendance = Attendance {
            id: Uuid::new_v4(),
            employee_id: employee.id,
            clock_in_at: now,
            clock_out_at: None,
            clock_in_loc: request.location,
            clock_out_loc: None,
            done_for_the_day: false,
            late_clock_in: !calendar::is_weekend(today) && now > late_after,
            early_clock_out: false,
            closed_automatically: None,
            overtime: None,
        };
        self.attendances.create(&attendance).await?;

        if let Err(e) = self
            .employees
            .set_status(employee.id, EmployeeStatus::Available)
            .await
        {
            log::error!("Failed to mark employee {} available: {}", employee.id, e);
        }

        log::info!(
            "Employee {} clocked in{}",
            employee.id,
            if attendance.late_clock_in { " late" } else { "" }
        );
        Ok(attendance)
    }

    async fn active_session(&self, employee_id: Uuid) -> AppResult<Attendance> {
        self.attendances
            .find_active(employee_id)
            .await?
            .ok_or_else(|| AppError::domain("Attendance", "employee has not clocked in"))
    }

    /// Preview of the overtime the session would produce if closed now.
    pub async fn request_clock_out(&self, employee_id: Uuid) -> AppResult<OvertimeReport> {
        let employee = self.employee(employee_id).await?;
        let session = self.active_session(employee.id).await?;
        self.overtime.report_for(&employee, session.clock_in_at).await
    }

    pub async fn clock_out(&self, employee_id: Uuid, request: ClockOutRequest) -> AppResult<Attendance> {
        let employee = self.employee(employee_id).await?;
        let mut session = self.active_session(employee.id).await?;
        let policy = self.configuration.current().await?;

        ensure_within_range(&session.clock_in_loc, &request.location)?;

        let now = self.clock.now();
        let tz = self.clock.timezone();
        let work_date = calendar::local_date(session.clock_in_at, tz);
        let early_before = policy.office_end_on(work_date, tz) - policy.acceptance_interval();

        let report = self.overtime.report_for(&employee, session.clock_in_at).await?;

        let overtime = match employee.manager_id {
            Some(manager_id) if request.confirm_overtime && report.should_create_record() => {
                let reason = request.reason.clone().unwrap_or_default();
                validate_reason(&reason, OVERTIME_REASON_MIN, OVERTIME_REASON_MAX)?;
                Some(Overtime {
                    id: Uuid::new_v4(),
                    attendance_id: session.id,
                    employee_id: employee.id,
                    manager_id,
                    duration: report.overtime_accepted_duration,
                    reason: reason.trim().to_string(),
                    manager_decision: Decision::Undecided,
                    closed_automatically: None,
                    created_at: now,
                })
            }
            _ => None,
        };

        session.clock_out_at = Some(now);
        session.clock_out_loc = Some(request.location);
        session.done_for_the_day = true;
        session.early_clock_out = !calendar::is_weekend(work_date) && now < early_before;

        if !self.attendances.close(&session, overtime.as_ref()).await? {
            return Err(AppError::domain("Attendance", "attendance was already closed"));
        }

        if let (Some(overtime), Some(manager_id)) = (&overtime, employee.manager_id) {
            match self.employees.get_by_id(manager_id).await {
                Ok(Some(manager)) => {
                    self.notifications
                        .notify(
                            NotificationKind::OvertimeSubmitted,
                            &manager,
                            serde_json::json!({
                                "overtimeId": overtime.id,
                                "employee": employee.full_name,
                                "durationSeconds": overtime.duration.num_seconds(),
                            }),
                        )
                        .await;
                }
                Ok(None) => log::warn!("Manager {} of employee {} not found", manager_id, employee.id),
                Err(e) => log::error!("Failed to load manager {}: {}", manager_id, e),
            }
        }

        log::info!(
            "Employee {} clocked out{}",
            employee.id,
            if overtime.is_some() { " with overtime" } else { "" }
        );
        session.overtime = overtime;
        Ok(session)
    }
}

fn ensure_within_range(clock_in: &GeoPoint, clock_out: &GeoPoint) -> AppResult<()> {
    if !clock_out.is_valid() {
        return Err(AppError::BadRequest("invalid clock-out location".to_string()));
    }
    if clock_in.distance_to(clock_out) > MAX_CLOCK_OUT_DISTANCE_METERS {
        return Err(AppError::domain(
            "Attendance",
            "clock-out location is too far from clock-in location",
        ));
    }
    Ok(())
}
