use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::calendar;
use crate::clock::Clock;
use crate::database::{
    models::{
        ContractType, Decision, Employee, HistoryScope, LeaveApplication, LeaveCalendarEntry,
        LeaveDecision, LeaveFilter, LeaveHistoryQuery, LeaveReport, LeaveRequest, LeaveType,
        OverflowChoice, Page, Period, UNPAID_QUOTA_CEILING,
    },
    stores::{EmployeeStore, LeaveStore},
};
use crate::error::{AppError, AppResult};
use crate::services::configuration::ConfigurationService;
use crate::services::notification::{NotificationKind, NotificationService};
use crate::services::quota_ledger::QuotaLedger;
use crate::services::validation::{ensure_staff_of, month_bounds, resolve_period, validate_reason};

pub const LEAVE_REASON_MIN: usize = 20;
pub const LEAVE_REASON_MAX: usize = 1000;

fn leave_error(message: impl Into<String>) -> AppError {
    AppError::domain("Leave", message)
}

/// Rejects malformed applications before any store is consulted.
pub fn validate_application(application: &LeaveApplication) -> AppResult<LeaveType> {
    let leave_type = application
        .leave_type
        .ok_or_else(|| AppError::BadRequest("leave type is required".to_string()))?;

    if application.from > application.to {
        return Err(leave_error("start date must not be after end date"));
    }
    validate_reason(&application.reason, LEAVE_REASON_MIN, LEAVE_REASON_MAX)?;
    if !calendar::contains_weekday(application.from, application.to) {
        return Err(leave_error("leave must include at least one working day"));
    }

    Ok(leave_type)
}

/// Quota check for a validated application against the remaining balances.
///
/// `remaining` is the balance of the requested type, `yearly` the annual
/// balance offered as a marriage fallback.
pub fn compute_report(
    leave_type: LeaveType,
    duration: i64,
    remaining: i64,
    yearly: i64,
) -> AppResult<LeaveReport> {
    let mut report = LeaveReport {
        is_leakage: false,
        excess: 0,
        request_type: leave_type,
        remaining_quota: remaining,
        available_types: Vec::new(),
        available_quotas: Vec::new(),
    };

    match leave_type {
        LeaveType::Sick => {
            report.remaining_quota = -1;
            return Ok(report);
        }
        LeaveType::Unpaid => {
            if duration > UNPAID_QUOTA_CEILING {
                return Err(leave_error(format!(
                    "unpaid leave cannot be longer than {} days",
                    UNPAID_QUOTA_CEILING
                )));
            }
            report.remaining_quota = UNPAID_QUOTA_CEILING;
            return Ok(report);
        }
        LeaveType::Annual | LeaveType::Marriage => {
            if remaining <= 0 {
                return Err(leave_error(format!(
                    "there are no more quota for leave type {}. Please consider selecting other type",
                    leave_type.as_str().to_lowercase()
                )));
            }
        }
    }

    if duration > remaining {
        report.is_leakage = true;
        report.excess = duration - remaining;

        if leave_type == LeaveType::Marriage && yearly > 0 {
            report.available_types.push(LeaveType::Annual);
            report.available_quotas.push(yearly);
        }
        report.available_types.push(LeaveType::Unpaid);
        report.available_quotas.push(UNPAID_QUOTA_CEILING);
    }

    Ok(report)
}

/// Checks the employee's split of the excess against what the report offered
/// and returns the chosen blocks in fallback order.
pub fn validate_overflows(
    report: &LeaveReport,
    overflows: &[OverflowChoice],
) -> AppResult<Vec<OverflowChoice>> {
    let chosen: Vec<&OverflowChoice> = overflows.iter().filter(|o| o.days != 0).collect();

    if !report.is_leakage {
        if !chosen.is_empty() {
            return Err(leave_error("this request does not exceed its quota"));
        }
        return Ok(Vec::new());
    }

    for choice in &chosen {
        let Some(index) = report
            .available_types
            .iter()
            .position(|t| *t == choice.leave_type)
        else {
            return Err(leave_error(format!(
                "the excess type of {} is not available in the option",
                choice.leave_type.as_str().to_lowercase()
            )));
        };
        if choice.days < 0 || choice.days > report.available_quotas[index] {
            return Err(leave_error(format!(
                "the amount of excess for {} exceeded limit",
                choice.leave_type
            )));
        }
        if chosen.iter().filter(|o| o.leave_type == choice.leave_type).count() > 1 {
            return Err(leave_error(format!(
                "the excess type of {} was chosen more than once",
                choice.leave_type.as_str().to_lowercase()
            )));
        }
    }

    let total: i64 = chosen.iter().map(|o| o.days).sum();
    if total != report.excess {
        return Err(leave_error(format!(
            "the sum of excess days must be exactly {}",
            report.excess
        )));
    }

    Ok(report
        .available_types
        .iter()
        .filter_map(|t| chosen.iter().find(|o| o.leave_type == *t).map(|o| **o))
        .collect())
}

/// Lays out the parent block and its overflow children without persisting.
///
/// The parent covers the quota-backed working days; each child is the next
/// contiguous run of working days for its fallback type. A requester without
/// a manager is approved at the manager stage immediately.
pub fn plan_group(
    employee: &Employee,
    application: &LeaveApplication,
    report: &LeaveReport,
    overflows: &[OverflowChoice],
    now: DateTime<Utc>,
) -> LeaveRequest {
    let parent_to = if report.is_leakage {
        calendar::working_day_block_end(application.from, report.remaining_quota)
    } else {
        application.to
    };

    let manager_decision = if employee.manager_id.is_none() {
        Decision::approved(now)
    } else {
        Decision::Undecided
    };

    let mut parent = LeaveRequest {
        id: Uuid::new_v4(),
        employee_id: employee.id,
        from: application.from,
        to: parent_to,
        leave_type: report.request_type,
        reason: application.reason.trim().to_string(),
        parent_id: None,
        children: Vec::new(),
        manager_id: employee.manager_id,
        hr_id: None,
        manager_decision: manager_decision.clone(),
        hr_decision: Decision::Undecided,
        closed_automatically: None,
        created_at: now,
    };

    let mut next_start = parent_to.succ_opt().map(calendar::next_working_day);
    for choice in overflows {
        let Some(from) = next_start else {
            break;
        };
        let to = calendar::working_day_block_end(from, choice.days);

        parent.children.push(LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: employee.id,
            from,
            to,
            leave_type: choice.leave_type,
            reason: format!(
                "This is an extension leave of {} made by {} from {} to {}. This reason is autogenerated.",
                parent.leave_type,
                employee.first_name(),
                parent.from,
                parent.to
            ),
            parent_id: Some(parent.id),
            children: Vec::new(),
            manager_id: employee.manager_id,
            hr_id: None,
            manager_decision: manager_decision.clone(),
            hr_decision: Decision::Undecided,
            closed_automatically: None,
            created_at: now,
        });

        next_start = to.succ_opt().map(calendar::next_working_day);
    }

    parent
}

#[derive(Clone)]
pub struct LeaveRequestService {
    leaves: Arc<dyn LeaveStore>,
    employees: Arc<dyn EmployeeStore>,
    ledger: QuotaLedger,
    configuration: ConfigurationService,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
}

impl LeaveRequestService {
    pub fn new(
        leaves: Arc<dyn LeaveStore>,
        employees: Arc<dyn EmployeeStore>,
        ledger: QuotaLedger,
        configuration: ConfigurationService,
        notifications: NotificationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leaves,
            employees,
            ledger,
            configuration,
            notifications,
            clock,
        }
    }

    async fn employee(&self, employee_id: Uuid) -> AppResult<Employee> {
        self.employees
            .get_by_id(employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("employee {}", employee_id)))
    }

    /// Validates an application and reports how it fits the employee's quota.
    /// Nothing is persisted.
    pub async fn build_report(
        &self,
        employee_id: Uuid,
        application: &LeaveApplication,
    ) -> AppResult<LeaveReport> {
        let employee = self.employee(employee_id).await?;
        self.report_for(&employee, application).await
    }

    async fn report_for(
        &self,
        employee: &Employee,
        application: &LeaveApplication,
    ) -> AppResult<LeaveReport> {
        if employee.contract_type == ContractType::Intern {
            return Err(leave_error("intern employees are not allowed to request leave"));
        }

        let leave_type = validate_application(application)?;

        if self
            .leaves
            .has_overlap(employee.id, application.from, application.to)
            .await?
        {
            return Err(leave_error(
                "there is already a leave request covering some of these dates",
            ));
        }

        let duration = calendar::count_working_days(application.from, application.to);
        if leave_type == LeaveType::Sick {
            return compute_report(leave_type, duration, 0, 0);
        }

        if leave_type == LeaveType::Marriage {
            let married = self
                .employees
                .get_biodata(employee.id)
                .await?
                .map(|b| b.marital_status)
                .unwrap_or(false);
            if married {
                return Err(leave_error("employee is already married"));
            }
        }

        let policy = self.configuration.current().await?;
        if let Some(rule) = policy.lead_time_rule(leave_type) {
            let days_until = calendar::days_until(self.clock.today(), application.from);
            if !rule.is_satisfied(days_until, policy.acceptance_leave_interval) {
                return Err(leave_error(format!(
                    "{} leave must be requested at least {} days before it starts",
                    leave_type.as_str().to_lowercase(),
                    policy.acceptance_leave_interval
                )));
            }
        }

        let quota = self.ledger.quota_of(employee.id).await?;
        let remaining = quota.remaining(leave_type).unwrap_or(0);
        compute_report(leave_type, duration, remaining, quota.yearly_count)
    }

    /// Materializes the request group and reserves quota for every block in
    /// one write.
    pub async fn confirm(&self, employee_id: Uuid, decision: LeaveDecision) -> AppResult<LeaveRequest> {
        let employee = self.employee(employee_id).await?;
        let report = self.report_for(&employee, &decision.application).await?;
        let overflows = validate_overflows(&report, &decision.overflows)?;

        let group = plan_group(
            &employee,
            &decision.application,
            &report,
            &overflows,
            self.clock.now(),
        );

        let reservations: Vec<_> = std::iter::once(&group)
            .chain(group.children.iter())
            .filter_map(QuotaLedger::reserve_for)
            .collect();

        self.leaves.create_group(&group, &reservations).await?;

        log::info!(
            "Employee {} requested {} leave {} from {} to {} with {} overflow block(s)",
            employee.id,
            group.leave_type,
            group.id,
            group.from,
            group.to,
            group.children.len()
        );

        if let Some(manager_id) = employee.manager_id {
            match self.employees.get_by_id(manager_id).await {
                Ok(Some(manager)) => {
                    self.notifications
                        .notify(
                            NotificationKind::LeaveSubmitted,
                            &manager,
                            serde_json::json!({
                                "leaveId": group.id,
                                "employee": employee.full_name,
                                "from": group.from,
                                "to": group.children.last().map_or(group.to, |c| c.to),
                            }),
                        )
                        .await;
                }
                Ok(None) => log::warn!("Manager {} of employee {} not found", manager_id, employee.id),
                Err(e) => log::error!("Failed to load manager {}: {}", manager_id, e),
            }
        }

        Ok(group)
    }

    pub async fn my_leaves(&self, employee_id: Uuid) -> AppResult<Vec<LeaveRequest>> {
        Ok(self.leaves.find_by_employee(employee_id).await?)
    }

    pub async fn leave(&self, leave_id: Uuid) -> AppResult<LeaveRequest> {
        self.leaves
            .find_by_id(leave_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("leave {}", leave_id)))
    }

    pub async fn incoming_for_manager(&self, manager_id: Uuid) -> AppResult<Vec<LeaveRequest>> {
        Ok(self.leaves.find_pending_for_manager(manager_id).await?)
    }

    pub async fn incoming_for_hr(&self) -> AppResult<Vec<LeaveRequest>> {
        Ok(self.leaves.find_pending_for_hr().await?)
    }

    async fn history(
        &self,
        scope: HistoryScope,
        settled_only: bool,
        query: &LeaveHistoryQuery,
    ) -> AppResult<Page<LeaveRequest>> {
        let filter = LeaveFilter {
            scope,
            window: resolve_period(&query.period, self.clock.today(), self.clock.timezone())?,
            status: query.status,
            settled_only,
        };
        Ok(self.leaves.history(&filter, &query.page).await?)
    }

    /// Groups routed to the manager that they acted on or that were auto-closed.
    pub async fn history_for_manager(
        &self,
        manager_id: Uuid,
        query: &LeaveHistoryQuery,
    ) -> AppResult<Page<LeaveRequest>> {
        self.history(HistoryScope::StaffOf(manager_id), true, query)
            .await
    }

    pub async fn history_for_hr(&self, query: &LeaveHistoryQuery) -> AppResult<Page<LeaveRequest>> {
        self.history(HistoryScope::All, false, query).await
    }

    /// Every group of one of the manager's staff.
    pub async fn staff_leave_history(
        &self,
        manager_id: Uuid,
        employee_id: Uuid,
        query: &LeaveHistoryQuery,
    ) -> AppResult<Page<LeaveRequest>> {
        let employee = self.employee(employee_id).await?;
        ensure_staff_of(&employee, manager_id)?;
        self.history(HistoryScope::Employee(employee_id), false, query)
            .await
    }

    /// Weekdays of the month on which someone has an approved leave block.
    /// Days nobody is away are left out.
    pub async fn whos_taking_leave(
        &self,
        year: i32,
        month: u32,
    ) -> AppResult<BTreeMap<NaiveDate, Vec<LeaveCalendarEntry>>> {
        resolve_period(
            &Period::Month { year, month },
            self.clock.today(),
            self.clock.timezone(),
        )?;
        let (first, next) = month_bounds(year, month)
            .ok_or_else(|| AppError::BadRequest("invalid month".to_string()))?;
        let last = next.pred_opt().unwrap_or(first);

        let blocks = self.leaves.find_approved_between(first, last).await?;

        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut calendar_days: BTreeMap<NaiveDate, Vec<LeaveCalendarEntry>> = BTreeMap::new();
        for block in blocks {
            let full_name = match names.get(&block.employee_id) {
                Some(name) => name.clone(),
                None => {
                    let Some(employee) = self.employees.get_by_id(block.employee_id).await? else {
                        log::warn!(
                            "Employee {} of leave {} not found, leaving it off the calendar",
                            block.employee_id,
                            block.id
                        );
                        continue;
                    };
                    names.insert(employee.id, employee.full_name.clone());
                    employee.full_name
                }
            };

            let from = block.from.max(first);
            let to = block.to.min(last);
            for day in from.iter_days().take_while(|d| *d <= to) {
                if calendar::is_weekend(day) {
                    continue;
                }
                calendar_days.entry(day).or_default().push(LeaveCalendarEntry {
                    leave_id: block.id,
                    employee_id: block.employee_id,
                    full_name: full_name.clone(),
                    leave_type: block.leave_type,
                });
            }
        }

        Ok(calendar_days)
    }
}
