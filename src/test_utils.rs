//! In-memory doubles for the store and notification seams.
//!
//! `MemoryStore` honours the same guards as the PostgreSQL repositories:
//! conditional writes only apply when their guard matches, and a failing
//! multi-record write leaves nothing behind.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::database::models::{
    Attendance, AttendanceFilter, AutoClosure, ConfigurationChangeLog, ConfigurationPolicy,
    Decision, Employee, EmployeeBiodata, EmployeeStatus, HistoryScope, LeaveFilter, LeaveQuota,
    LeaveRequest, LeaveStatus, LeaveType, Overtime, OvertimeFilter, Page, PageRequest,
    QuotaAdjustment, StagedChanges, StagedSlot,
};
use crate::database::stores::{
    AttendanceStore, ConfigStore, EmployeeStore, GroupDecision, LeaveStore, OvertimeStore,
    QuotaStore, StoreResult,
};
use crate::error::StoreError;
use crate::services::notification::{
    Mailer, Notification, NotificationError, NotificationKind, Notifier,
};

#[derive(Debug, Clone, Default)]
struct State {
    employees: HashMap<Uuid, Employee>,
    biodata: HashMap<Uuid, EmployeeBiodata>,
    quotas: HashMap<Uuid, LeaveQuota>,
    /// Flat: children are stored as their own rows.
    leaves: HashMap<Uuid, LeaveRequest>,
    attendances: HashMap<Uuid, Attendance>,
    overtimes: HashMap<Uuid, Overtime>,
    policy: Option<ConfigurationPolicy>,
    staged: HashMap<StagedSlot, StagedChanges>,
    change_logs: Vec<ConfigurationChangeLog>,
}

impl State {
    fn apply_adjustment(&mut self, adjustment: &QuotaAdjustment) -> StoreResult<()> {
        if adjustment.column().is_none() {
            return Ok(());
        }

        let Some(quota) = self.quotas.get_mut(&adjustment.employee_id) else {
            return Err(if adjustment.guarded {
                StoreError::InsufficientQuota(adjustment.leave_type)
            } else {
                StoreError::NotFound
            });
        };

        let counter = match adjustment.leave_type {
            LeaveType::Annual => &mut quota.yearly_count,
            LeaveType::Marriage => &mut quota.marriage_count,
            LeaveType::Unpaid => &mut quota.unpaid_count,
            LeaveType::Sick => return Ok(()),
        };

        if adjustment.guarded && *counter + adjustment.delta < 0 {
            return Err(StoreError::InsufficientQuota(adjustment.leave_type));
        }
        *counter += adjustment.delta;
        Ok(())
    }

    fn apply_adjustments(&mut self, adjustments: &[QuotaAdjustment]) -> StoreResult<()> {
        adjustments.iter().try_for_each(|a| self.apply_adjustment(a))
    }

    fn with_children(&self, root: &LeaveRequest) -> LeaveRequest {
        let mut root = root.clone();
        let mut children: Vec<LeaveRequest> = self
            .leaves
            .values()
            .filter(|l| l.parent_id == Some(root.id))
            .cloned()
            .collect();
        children.sort_by_key(|c| c.from);
        root.children = children;
        root
    }

    fn roots_where(&self, predicate: impl Fn(&LeaveRequest) -> bool) -> Vec<LeaveRequest> {
        let mut roots: Vec<LeaveRequest> = self
            .leaves
            .values()
            .filter(|l| l.is_root() && predicate(l))
            .map(|l| self.with_children(l))
            .collect();
        roots.sort_by_key(|l| (l.from, l.created_at));
        roots
    }

    fn overtime_of(&self, attendance_id: Uuid) -> Option<Overtime> {
        self.overtimes
            .values()
            .find(|o| o.attendance_id == attendance_id)
            .cloned()
    }

    fn with_overtime(&self, attendance: &Attendance) -> Attendance {
        let mut attendance = attendance.clone();
        attendance.overtime = self.overtime_of(attendance.id);
        attendance
    }

    fn reports_to(&self, employee_id: Uuid, manager_id: Uuid) -> bool {
        self.employees
            .get(&employee_id)
            .is_some_and(|e| e.manager_id == Some(manager_id))
    }
}

fn awaiting_decision(leave: &LeaveRequest) -> bool {
    leave.closed_automatically.is_none()
        && leave.hr_decision.is_undecided()
        && !leave.manager_decision.is_rejected()
}

fn leave_matches(leave: &LeaveRequest, filter: &LeaveFilter) -> bool {
    let in_scope = match filter.scope {
        HistoryScope::Employee(id) => leave.employee_id == id,
        HistoryScope::StaffOf(manager_id) => leave.manager_id == Some(manager_id),
        HistoryScope::All => true,
    };
    let settled = leave.closed_automatically.is_some() || !leave.manager_decision.is_undecided();
    leave.is_root()
        && in_scope
        && filter.window.is_none_or(|w| w.contains(leave.created_at))
        && filter.status.is_none_or(|status| leave.status() == status)
        && (!filter.settled_only || settled)
}

fn overtime_matches(overtime: &Overtime, filter: &OvertimeFilter) -> bool {
    let in_scope = match filter.scope {
        HistoryScope::Employee(id) => overtime.employee_id == id,
        HistoryScope::StaffOf(manager_id) => overtime.manager_id == manager_id,
        HistoryScope::All => true,
    };
    in_scope
        && filter.window.is_none_or(|w| w.contains(overtime.created_at))
        && filter.status.is_none_or(|status| overtime.status() == status)
        && (!filter.settled_only || !overtime.is_open())
}

fn blocks_dates(leave: &LeaveRequest) -> bool {
    leave.closed_automatically.is_none()
        && !leave.manager_decision.is_rejected()
        && !leave.hr_decision.is_rejected()
}

/// Every store trait over one shared in-memory state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    failing: Arc<Mutex<HashSet<Uuid>>>,
    failing_reads: Arc<Mutex<HashSet<Uuid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Runs `f` on a copy and keeps the copy only on success.
    fn transact<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut draft = state.clone();
        let value = f(&mut draft)?;
        *state = draft;
        Ok(value)
    }

    /// Like `transact`, but a `false` guard result also discards the copy.
    fn conditional(&self, f: impl FnOnce(&mut State) -> StoreResult<bool>) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut draft = state.clone();
        if f(&mut draft)? {
            *state = draft;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check_failure(&self, id: Uuid) -> StoreResult<()> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(&id) {
            return Err(StoreError::Backend(format!("injected failure for {}", id)));
        }
        Ok(())
    }

    /// Makes every later write touching `id` fail with a backend error. For a
    /// new leave group `id` may be the employee, and the failure then hits
    /// after the rows and reservations were staged.
    pub fn fail_writes_for(&self, id: Uuid) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    /// Makes every later employee lookup of `id` fail with a backend error.
    pub fn fail_reads_for(&self, id: Uuid) {
        self.failing_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    pub fn insert_employee(&self, employee: Employee) {
        let _ = self.transact(|s| {
            s.employees.insert(employee.id, employee);
            Ok(())
        });
    }

    pub fn set_biodata(&self, employee_id: Uuid, marital_status: bool) {
        let _ = self.transact(|s| {
            s.biodata.insert(
                employee_id,
                EmployeeBiodata {
                    employee_id,
                    marital_status,
                },
            );
            Ok(())
        });
    }

    pub fn set_quota(&self, quota: LeaveQuota) {
        let _ = self.transact(|s| {
            s.quotas.insert(quota.employee_id, quota);
            Ok(())
        });
    }

    pub fn set_policy(&self, policy: ConfigurationPolicy) {
        let _ = self.transact(|s| {
            s.policy = Some(policy);
            Ok(())
        });
    }

    /// Stores a root and its children without touching quotas.
    pub fn insert_leave(&self, root: LeaveRequest) {
        let _ = self.transact(|s| {
            let mut root = root;
            for child in std::mem::take(&mut root.children) {
                s.leaves.insert(child.id, child);
            }
            s.leaves.insert(root.id, root);
            Ok(())
        });
    }

    pub fn insert_attendance(&self, attendance: Attendance) {
        let _ = self.transact(|s| {
            let mut attendance = attendance;
            if let Some(overtime) = attendance.overtime.take() {
                s.overtimes.insert(overtime.id, overtime);
            }
            s.attendances.insert(attendance.id, attendance);
            Ok(())
        });
    }

    pub fn insert_overtime(&self, overtime: Overtime) {
        let _ = self.transact(|s| {
            s.overtimes.insert(overtime.id, overtime);
            Ok(())
        });
    }

    pub fn quota(&self, employee_id: Uuid) -> Option<LeaveQuota> {
        self.read(|s| s.quotas.get(&employee_id).copied())
    }

    pub fn employee(&self, id: Uuid) -> Option<Employee> {
        self.read(|s| s.employees.get(&id).cloned())
    }

    pub fn leave(&self, id: Uuid) -> Option<LeaveRequest> {
        self.read(|s| s.leaves.get(&id).map(|l| s.with_children(l)))
    }

    pub fn leave_count(&self) -> usize {
        self.read(|s| s.leaves.len())
    }

    pub fn attendance(&self, id: Uuid) -> Option<Attendance> {
        self.read(|s| s.attendances.get(&id).map(|a| s.with_overtime(a)))
    }

    pub fn overtime(&self, id: Uuid) -> Option<Overtime> {
        self.read(|s| s.overtimes.get(&id).cloned())
    }

    pub fn overtime_count(&self) -> usize {
        self.read(|s| s.overtimes.len())
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn adjust(&self, adjustment: &QuotaAdjustment) -> StoreResult<()> {
        self.transact(|s| s.apply_adjustment(adjustment))
    }

    async fn get(&self, employee_id: Uuid) -> StoreResult<Option<LeaveQuota>> {
        Ok(self.quota(employee_id))
    }
}

#[async_trait]
impl EmployeeStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Employee>> {
        let failing = self
            .failing_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id);
        if failing {
            return Err(StoreError::Backend(format!("injected read failure for {}", id)));
        }
        Ok(self.employee(id))
    }

    async fn get_biodata(&self, employee_id: Uuid) -> StoreResult<Option<EmployeeBiodata>> {
        Ok(self.read(|s| s.biodata.get(&employee_id).cloned()))
    }

    async fn set_status(&self, employee_id: Uuid, status: EmployeeStatus) -> StoreResult<()> {
        self.transact(|s| {
            let employee = s.employees.get_mut(&employee_id).ok_or(StoreError::NotFound)?;
            employee.status = status;
            Ok(())
        })
    }

    async fn reset_available(&self) -> StoreResult<u64> {
        self.transact(|s| {
            let mut changed = 0;
            for employee in s.employees.values_mut() {
                if employee.status == EmployeeStatus::Available {
                    employee.status = EmployeeStatus::Unavailable;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn create_group(
        &self,
        root: &LeaveRequest,
        reservations: &[QuotaAdjustment],
    ) -> StoreResult<()> {
        self.check_failure(root.id)?;
        self.transact(|s| {
            let mut stored = root.clone();
            for child in std::mem::take(&mut stored.children) {
                s.leaves.insert(child.id, child);
            }
            s.leaves.insert(stored.id, stored);
            s.apply_adjustments(reservations)?;
            self.check_failure(root.employee_id)
        })
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        Ok(self.leave(id))
    }

    async fn find_by_employee(&self, employee_id: Uuid) -> StoreResult<Vec<LeaveRequest>> {
        Ok(self.read(|s| s.roots_where(|l| l.employee_id == employee_id)))
    }

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<LeaveRequest>> {
        Ok(self.read(|s| {
            s.roots_where(|l| {
                l.manager_id == Some(manager_id)
                    && l.manager_decision.is_undecided()
                    && l.closed_automatically.is_none()
            })
        }))
    }

    async fn find_pending_for_hr(&self) -> StoreResult<Vec<LeaveRequest>> {
        Ok(self.read(|s| {
            s.roots_where(|l| {
                l.manager_decision.is_approved()
                    && l.hr_decision.is_undecided()
                    && l.closed_automatically.is_none()
            })
        }))
    }

    async fn has_overlap(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<bool> {
        Ok(self.read(|s| {
            s.leaves.values().any(|l| {
                l.employee_id == employee_id && l.from <= to && l.to >= from && blocks_dates(l)
            })
        }))
    }

    async fn employee_on_leave(&self, employee_id: Uuid, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.read(|s| {
            s.leaves.values().any(|l| {
                l.employee_id == employee_id
                    && l.from <= date
                    && date <= l.to
                    && l.status() == LeaveStatus::Approved
            })
        }))
    }

    async fn save_manager_decision(&self, decision: &GroupDecision) -> StoreResult<bool> {
        self.check_failure(decision.root_id)?;
        self.conditional(|s| {
            for (id, block_decision) in &decision.decisions {
                let Some(block) = s.leaves.get_mut(id) else {
                    return Ok(false);
                };
                let shape_ok = if *id == decision.root_id {
                    block.parent_id.is_none()
                } else {
                    block.parent_id.is_some()
                };
                if !shape_ok
                    || !block.manager_decision.is_undecided()
                    || block.closed_automatically.is_some()
                {
                    return Ok(false);
                }
                block.manager_decision = block_decision.clone();
            }
            s.apply_adjustments(&decision.releases)?;
            Ok(true)
        })
    }

    async fn save_hr_decision(&self, decision: &GroupDecision) -> StoreResult<bool> {
        self.check_failure(decision.root_id)?;
        self.conditional(|s| {
            for (id, block_decision) in &decision.decisions {
                let Some(block) = s.leaves.get_mut(id) else {
                    return Ok(false);
                };
                if !block.manager_decision.is_approved()
                    || !block.hr_decision.is_undecided()
                    || block.closed_automatically.is_some()
                {
                    return Ok(false);
                }
                block.hr_decision = block_decision.clone();
                block.hr_id = Some(decision.actor_id);
            }
            s.apply_adjustments(&decision.releases)?;
            Ok(true)
        })
    }

    async fn find_due_for_closing(&self, until: NaiveDate) -> StoreResult<Vec<LeaveRequest>> {
        Ok(self.read(|s| {
            s.roots_where(|l| {
                l.leave_type != LeaveType::Sick && l.from <= until && awaiting_decision(l)
            })
        }))
    }

    async fn close_automatically(&self, root_id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        self.check_failure(root_id)?;
        self.conditional(|s| {
            let mut closed = Vec::new();
            for block in s.leaves.values_mut() {
                let in_group = block.id == root_id || block.parent_id == Some(root_id);
                if in_group && awaiting_decision(block) {
                    block.closed_automatically = Some(closure.clone());
                    closed.push(block.clone());
                }
            }

            if !closed.iter().any(|b| b.id == root_id && b.is_root()) {
                return Ok(false);
            }

            let releases: Vec<QuotaAdjustment> =
                closed.iter().filter_map(QuotaAdjustment::release_of).collect();
            s.apply_adjustments(&releases)?;
            Ok(true)
        })
    }

    async fn history(
        &self,
        filter: &LeaveFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<LeaveRequest>> {
        Ok(self.read(|s| {
            let mut roots: Vec<LeaveRequest> = s
                .leaves
                .values()
                .filter(|l| leave_matches(l, filter))
                .map(|l| s.with_children(l))
                .collect();
            roots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Page::slice(roots, page)
        }))
    }

    async fn find_approved_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<LeaveRequest>> {
        Ok(self.read(|s| {
            let mut blocks: Vec<LeaveRequest> = s
                .leaves
                .values()
                .filter(|l| l.from <= to && l.to >= from && l.status() == LeaveStatus::Approved)
                .cloned()
                .collect();
            blocks.sort_by_key(|l| (l.from, l.employee_id));
            blocks
        }))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_in_range(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Option<Attendance>> {
        Ok(self.read(|s| {
            s.attendances
                .values()
                .filter(|a| a.employee_id == employee_id && a.clock_in_at >= from && a.clock_in_at <= to)
                .max_by_key(|a| a.clock_in_at)
                .map(|a| s.with_overtime(a))
        }))
    }

    async fn find_active(&self, employee_id: Uuid) -> StoreResult<Option<Attendance>> {
        Ok(self.read(|s| {
            s.attendances
                .values()
                .filter(|a| a.employee_id == employee_id && !a.done_for_the_day)
                .max_by_key(|a| a.clock_in_at)
                .map(|a| s.with_overtime(a))
        }))
    }

    async fn create(&self, attendance: &Attendance) -> StoreResult<()> {
        self.transact(|s| {
            if s
                .attendances
                .values()
                .any(|a| a.employee_id == attendance.employee_id && !a.done_for_the_day)
            {
                return Err(StoreError::Backend(
                    "employee already has an active attendance".to_string(),
                ));
            }
            let mut stored = attendance.clone();
            stored.overtime = None;
            s.attendances.insert(stored.id, stored);
            Ok(())
        })
    }

    async fn close(
        &self,
        attendance: &Attendance,
        overtime: Option<&Overtime>,
    ) -> StoreResult<bool> {
        self.check_failure(attendance.id)?;
        self.conditional(|s| {
            let Some(stored) = s.attendances.get_mut(&attendance.id) else {
                return Ok(false);
            };
            if stored.done_for_the_day {
                return Ok(false);
            }

            stored.clock_out_at = attendance.clock_out_at;
            stored.clock_out_loc = attendance.clock_out_loc;
            stored.done_for_the_day = true;
            stored.early_clock_out = attendance.early_clock_out;

            if let Some(overtime) = overtime {
                if s.overtimes.values().any(|o| o.attendance_id == attendance.id) {
                    return Err(StoreError::Backend(
                        "attendance already has overtime".to_string(),
                    ));
                }
                s.overtimes.insert(overtime.id, overtime.clone());
            }
            Ok(true)
        })
    }

    async fn find_open(&self) -> StoreResult<Vec<Attendance>> {
        Ok(self.read(|s| {
            let mut open: Vec<Attendance> = s
                .attendances
                .values()
                .filter(|a| !a.done_for_the_day)
                .cloned()
                .collect();
            open.sort_by_key(|a| a.clock_in_at);
            open
        }))
    }

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        self.check_failure(id)?;
        self.conditional(|s| {
            let Some(attendance) = s.attendances.get_mut(&id) else {
                return Ok(false);
            };
            if attendance.done_for_the_day {
                return Ok(false);
            }
            attendance.clock_out_at = Some(closure.at);
            attendance.done_for_the_day = true;
            attendance.closed_automatically = Some(closure.clone());
            Ok(true)
        })
    }

    async fn history(
        &self,
        filter: &AttendanceFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Attendance>> {
        Ok(self.read(|s| {
            let mut finished: Vec<Attendance> = s
                .attendances
                .values()
                .filter(|a| {
                    let in_scope = match filter.scope {
                        HistoryScope::Employee(id) => a.employee_id == id,
                        HistoryScope::StaffOf(manager_id) => s.reports_to(a.employee_id, manager_id),
                        HistoryScope::All => true,
                    };
                    a.done_for_the_day
                        && in_scope
                        && filter.window.is_none_or(|w| w.contains(a.clock_in_at))
                        && (!filter.late_only || a.late_clock_in)
                        && (!filter.early_only || a.early_clock_out)
                        && (!filter.closed_only || a.closed_automatically.is_some())
                })
                .map(|a| s.with_overtime(a))
                .collect();
            finished.sort_by(|a, b| b.clock_in_at.cmp(&a.clock_in_at));
            Page::slice(finished, page)
        }))
    }

    async fn weekly_overtime_sum(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Duration> {
        Ok(self.read(|s| {
            s.overtimes
                .values()
                .filter(|o| {
                    o.employee_id == employee_id
                        && o.created_at >= from
                        && o.created_at <= to
                        && o.counts_toward_week()
                })
                .fold(Duration::zero(), |sum, o| sum + o.duration)
        }))
    }
}

#[async_trait]
impl OvertimeStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Overtime>> {
        Ok(self.overtime(id))
    }

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<Overtime>> {
        Ok(self.read(|s| {
            let mut pending: Vec<Overtime> = s
                .overtimes
                .values()
                .filter(|o| o.manager_id == manager_id && o.is_open())
                .cloned()
                .collect();
            pending.sort_by_key(|o| o.created_at);
            pending
        }))
    }

    async fn save_manager_decision(&self, id: Uuid, decision: &Decision) -> StoreResult<bool> {
        self.check_failure(id)?;
        self.conditional(|s| match s.overtimes.get_mut(&id) {
            Some(overtime) if overtime.is_open() => {
                overtime.manager_decision = decision.clone();
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn find_undecided(&self) -> StoreResult<Vec<Overtime>> {
        Ok(self.read(|s| {
            let mut open: Vec<Overtime> = s.overtimes.values().filter(|o| o.is_open()).cloned().collect();
            open.sort_by_key(|o| o.created_at);
            open
        }))
    }

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        self.check_failure(id)?;
        self.conditional(|s| match s.overtimes.get_mut(&id) {
            Some(overtime) if overtime.is_open() => {
                overtime.closed_automatically = Some(closure.clone());
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn history(
        &self,
        filter: &OvertimeFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Overtime>> {
        Ok(self.read(|s| {
            let mut overtimes: Vec<Overtime> = s
                .overtimes
                .values()
                .filter(|o| overtime_matches(o, filter))
                .cloned()
                .collect();
            overtimes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Page::slice(overtimes, page)
        }))
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self) -> StoreResult<Option<ConfigurationPolicy>> {
        Ok(self.read(|s| s.policy.clone()))
    }

    async fn save(&self, policy: &ConfigurationPolicy) -> StoreResult<()> {
        self.transact(|s| {
            s.policy = Some(policy.clone());
            Ok(())
        })
    }

    async fn get_staged(&self, slot: StagedSlot) -> StoreResult<Option<StagedChanges>> {
        Ok(self.read(|s| s.staged.get(&slot).cloned()))
    }

    async fn stage(
        &self,
        slot: StagedSlot,
        changes: &StagedChanges,
        log: &ConfigurationChangeLog,
    ) -> StoreResult<()> {
        self.transact(|s| {
            s.staged.entry(slot).or_default().merge(changes);
            s.change_logs.push(log.clone());
            Ok(())
        })
    }

    async fn apply_staged(&self, slot: StagedSlot) -> StoreResult<bool> {
        self.transact(|s| {
            let Some(staged) = s.staged.remove(&slot) else {
                return Ok(false);
            };
            let mut policy = s.policy.clone().unwrap_or_default();
            staged.apply_to(&mut policy);
            s.policy = Some(policy);
            Ok(!staged.is_empty())
        })
    }

    async fn clear_staged(&self, slot: StagedSlot) -> StoreResult<()> {
        self.transact(|s| {
            s.staged.remove(&slot);
            Ok(())
        })
    }

    async fn change_logs(&self) -> StoreResult<Vec<ConfigurationChangeLog>> {
        Ok(self.read(|s| {
            let mut logs = s.change_logs.clone();
            logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            logs
        }))
    }
}

/// Notifier that records everything and reports a fixed subscriber count.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    subscribers: usize,
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn with_subscribers(subscribers: usize) -> Self {
        Self {
            subscribers,
            sent: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.kind == kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(
        &self,
        kind: NotificationKind,
        recipient_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<usize, NotificationError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Notification {
                kind,
                recipient_id,
                payload,
            });
        Ok(self.subscribers)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub template: String,
    pub data: serde_json::Value,
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentMail> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMail {
                to: to.to_string(),
                template: template.to_string(),
                data,
            });
        Ok(())
    }
}
