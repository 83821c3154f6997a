//! Persistence seams used by the services and closer jobs.
//!
//! Conditional writes return `Ok(false)` when their guard did not match
//! (the record was already decided or closed); the caller turns that into a
//! domain error or a skipped record.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::database::models::{
    Attendance, AttendanceFilter, AutoClosure, ConfigurationChangeLog, ConfigurationPolicy,
    Decision, Employee, EmployeeBiodata, EmployeeStatus, LeaveFilter, LeaveQuota, LeaveRequest,
    Overtime, OvertimeFilter, Page, PageRequest, QuotaAdjustment, StagedChanges, StagedSlot,
};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// One approval stage applied to a leave group.
#[derive(Debug, Clone)]
pub struct GroupDecision {
    pub root_id: Uuid,
    pub actor_id: Uuid,
    /// Decision per block; the root is always included.
    pub decisions: Vec<(Uuid, Decision)>,
    pub releases: Vec<QuotaAdjustment>,
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Applies one atomic `col = col + delta`; a guarded adjustment fails with
    /// `InsufficientQuota` instead of going negative.
    async fn adjust(&self, adjustment: &QuotaAdjustment) -> StoreResult<()>;

    async fn get(&self, employee_id: Uuid) -> StoreResult<Option<LeaveQuota>>;
}

#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Employee>>;

    async fn get_biodata(&self, employee_id: Uuid) -> StoreResult<Option<EmployeeBiodata>>;

    async fn set_status(&self, employee_id: Uuid, status: EmployeeStatus) -> StoreResult<()>;

    /// Flips every AVAILABLE employee to UNAVAILABLE, returning how many changed.
    async fn reset_available(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    /// Persists a root with its children and applies every reservation in
    /// one transaction.
    async fn create_group(
        &self,
        root: &LeaveRequest,
        reservations: &[QuotaAdjustment],
    ) -> StoreResult<()>;

    /// Loads a request with its children attached.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>>;

    async fn find_by_employee(&self, employee_id: Uuid) -> StoreResult<Vec<LeaveRequest>>;

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<LeaveRequest>>;

    async fn find_pending_for_hr(&self) -> StoreResult<Vec<LeaveRequest>>;

    /// Whether a pending or approved block of the employee intersects `[from, to]`.
    async fn has_overlap(&self, employee_id: Uuid, from: NaiveDate, to: NaiveDate)
    -> StoreResult<bool>;

    /// Whether a fully approved block covers `date`.
    async fn employee_on_leave(&self, employee_id: Uuid, date: NaiveDate) -> StoreResult<bool>;

    /// Guarded on the root being open with no manager decision.
    async fn save_manager_decision(&self, decision: &GroupDecision) -> StoreResult<bool>;

    /// Guarded on the root being open, manager-approved, with no HR decision.
    async fn save_hr_decision(&self, decision: &GroupDecision) -> StoreResult<bool>;

    /// Open, non-sick roots still awaiting a decision that start on or before `until`.
    async fn find_due_for_closing(&self, until: NaiveDate) -> StoreResult<Vec<LeaveRequest>>;

    /// Closes the root and every child still awaiting a decision, releasing
    /// the quota of exactly the blocks it closed. Guarded on the root still
    /// awaiting a decision.
    async fn close_automatically(&self, root_id: Uuid, closure: &AutoClosure)
    -> StoreResult<bool>;

    /// Roots with children attached, newest first.
    async fn history(&self, filter: &LeaveFilter, page: &PageRequest)
    -> StoreResult<Page<LeaveRequest>>;

    /// Fully approved, open blocks (roots and children, flat) intersecting `[from, to]`.
    async fn find_approved_between(&self, from: NaiveDate, to: NaiveDate)
    -> StoreResult<Vec<LeaveRequest>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// The session opened inside `[from, to]`, if any.
    async fn find_in_range(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Option<Attendance>>;

    async fn find_active(&self, employee_id: Uuid) -> StoreResult<Option<Attendance>>;

    async fn create(&self, attendance: &Attendance) -> StoreResult<()>;

    /// Writes the closed session and its overtime, guarded on the session still
    /// being open.
    async fn close(&self, attendance: &Attendance, overtime: Option<&Overtime>)
    -> StoreResult<bool>;

    async fn find_open(&self) -> StoreResult<Vec<Attendance>>;

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool>;

    /// Finished sessions with their overtime, newest clock-in first.
    async fn history(&self, filter: &AttendanceFilter, page: &PageRequest)
    -> StoreResult<Page<Attendance>>;

    /// Pending or approved, not auto-closed overtime created in `[from, to]`.
    async fn weekly_overtime_sum(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Duration>;
}

#[async_trait]
pub trait OvertimeStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Overtime>>;

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<Overtime>>;

    /// Guarded on the submission being open and undecided.
    async fn save_manager_decision(&self, id: Uuid, decision: &Decision) -> StoreResult<bool>;

    async fn find_undecided(&self) -> StoreResult<Vec<Overtime>>;

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool>;

    async fn history(&self, filter: &OvertimeFilter, page: &PageRequest)
    -> StoreResult<Page<Overtime>>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self) -> StoreResult<Option<ConfigurationPolicy>>;

    async fn save(&self, policy: &ConfigurationPolicy) -> StoreResult<()>;

    async fn get_staged(&self, slot: StagedSlot) -> StoreResult<Option<StagedChanges>>;

    /// Merges `changes` into the slot and records the change log.
    async fn stage(
        &self,
        slot: StagedSlot,
        changes: &StagedChanges,
        log: &ConfigurationChangeLog,
    ) -> StoreResult<()>;

    /// Overlays the slot onto the live policy and clears it in one
    /// transaction. Returns whether the slot held anything.
    async fn apply_staged(&self, slot: StagedSlot) -> StoreResult<bool>;

    async fn clear_staged(&self, slot: StagedSlot) -> StoreResult<()>;

    async fn change_logs(&self) -> StoreResult<Vec<ConfigurationChangeLog>>;
}
