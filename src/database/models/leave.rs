use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;
use crate::calendar;

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum LeaveType {
        Annual => "ANNUAL",
        Marriage => "MARRIAGE",
        Unpaid => "UNPAID",
        Sick => "SICK",
    }
}

impl LeaveType {
    /// Types that draw on a balance; sick leave never does.
    pub fn consumes_quota(&self) -> bool {
        !matches!(self, LeaveType::Sick)
    }
}

/// Outcome of one approval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    #[default]
    Undecided,
    Approved {
        at: DateTime<Utc>,
    },
    Rejected {
        at: DateTime<Utc>,
        reason: String,
    },
}

impl Decision {
    pub fn approved(at: DateTime<Utc>) -> Self {
        Decision::Approved { at }
    }

    pub fn rejected(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Decision::Rejected {
            at,
            reason: reason.into(),
        }
    }

    pub fn is_undecided(&self) -> bool {
        matches!(self, Decision::Undecided)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Decision::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Column triple used by the relational store: (approved, acted_at, reason).
    pub fn to_columns(&self) -> (Option<bool>, Option<DateTime<Utc>>, Option<String>) {
        match self {
            Decision::Undecided => (None, None, None),
            Decision::Approved { at } => (Some(true), Some(*at), None),
            Decision::Rejected { at, reason } => (Some(false), Some(*at), Some(reason.clone())),
        }
    }

    pub fn from_columns(
        approved: Option<bool>,
        at: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> Self {
        match (approved, at) {
            (Some(true), Some(at)) => Decision::Approved { at },
            (Some(false), Some(at)) => Decision::Rejected {
                at,
                reason: reason.unwrap_or_default(),
            },
            _ => Decision::Undecided,
        }
    }
}

/// Marker left by a closer job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoClosure {
    pub at: DateTime<Utc>,
    pub reason: String,
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum LeaveStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Closed => "CLOSED",
    }
}

/// Status is always derived from the decision fields, never stored.
pub fn derive_status(
    closed: Option<&AutoClosure>,
    manager: &Decision,
    hr: &Decision,
) -> LeaveStatus {
    if closed.is_some() {
        return LeaveStatus::Closed;
    }

    match (manager, hr) {
        (_, Decision::Undecided) => match manager {
            Decision::Rejected { .. } => LeaveStatus::Rejected,
            _ => LeaveStatus::Pending,
        },
        (Decision::Approved { .. }, Decision::Approved { .. }) => LeaveStatus::Approved,
        _ => LeaveStatus::Rejected,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub from: NaiveDate,
    /// Inclusive; the request covers this whole day.
    pub to: NaiveDate,
    pub leave_type: LeaveType,
    pub reason: String,
    pub parent_id: Option<Uuid>,
    pub children: Vec<LeaveRequest>,
    pub manager_id: Option<Uuid>,
    pub hr_id: Option<Uuid>,
    pub manager_decision: Decision,
    pub hr_decision: Decision,
    pub closed_automatically: Option<AutoClosure>,
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn status(&self) -> LeaveStatus {
        derive_status(
            self.closed_automatically.as_ref(),
            &self.manager_decision,
            &self.hr_decision,
        )
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Working days covered, which is also the amount reserved at creation.
    pub fn duration(&self) -> i64 {
        calendar::count_working_days(self.from, self.to)
    }

    pub fn total_duration(&self) -> i64 {
        self.duration() + self.children.iter().map(|c| c.duration()).sum::<i64>()
    }

    pub fn child(&self, id: Uuid) -> Option<&LeaveRequest> {
        self.children.iter().find(|c| c.id == id)
    }
}

/// Flat row as stored; `children` are stitched back by the repository.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveRequestRow {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
    pub reason: String,
    pub parent_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub hr_id: Option<Uuid>,
    pub approved_by_manager: Option<bool>,
    pub action_by_manager_at: Option<DateTime<Utc>>,
    pub manager_rejection_reason: Option<String>,
    pub approved_by_hr: Option<bool>,
    pub action_by_hr_at: Option<DateTime<Utc>>,
    pub hr_rejection_reason: Option<String>,
    pub closed_automatically_at: Option<DateTime<Utc>>,
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LeaveRequestRow> for LeaveRequest {
    fn from(row: LeaveRequestRow) -> Self {
        let closed_automatically = row.closed_automatically_at.map(|at| AutoClosure {
            at,
            reason: row.closed_reason.clone().unwrap_or_default(),
        });

        LeaveRequest {
            id: row.id,
            employee_id: row.employee_id,
            from: row.start_date,
            to: row.end_date,
            leave_type: row.leave_type,
            reason: row.reason,
            parent_id: row.parent_id,
            children: Vec::new(),
            manager_id: row.manager_id,
            hr_id: row.hr_id,
            manager_decision: Decision::from_columns(
                row.approved_by_manager,
                row.action_by_manager_at,
                row.manager_rejection_reason,
            ),
            hr_decision: Decision::from_columns(
                row.approved_by_hr,
                row.action_by_hr_at,
                row.hr_rejection_reason,
            ),
            closed_automatically,
            created_at: row.created_at,
        }
    }
}

/// What an employee submits when asking for time off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveApplication {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub leave_type: Option<LeaveType>,
    pub reason: String,
}

/// Quota check result shown to the employee before they confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveReport {
    pub is_leakage: bool,
    pub excess: i64,
    pub request_type: LeaveType,
    /// `-1` for sick leave, which has no balance.
    pub remaining_quota: i64,
    pub available_types: Vec<LeaveType>,
    pub available_quotas: Vec<i64>,
}

/// One slice of the excess moved to a fallback type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverflowChoice {
    pub leave_type: LeaveType,
    pub days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDecision {
    pub application: LeaveApplication,
    #[serde(default)]
    pub overflows: Vec<OverflowChoice>,
}

/// A reviewer's verdict on one block of a leave group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockVerdict {
    pub leave_id: Uuid,
    pub approve: bool,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveAction {
    pub leave_id: Uuid,
    pub approve: bool,
    pub rejection_reason: Option<String>,
    /// Required when approving a parent that has overflow children.
    #[serde(default)]
    pub children: Vec<BlockVerdict>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-08T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_status_pending_without_decisions() {
        let status = derive_status(None, &Decision::Undecided, &Decision::Undecided);
        assert_eq!(status, LeaveStatus::Pending);
    }

    #[test]
    fn test_status_waits_for_hr_after_manager_approval() {
        let status = derive_status(None, &Decision::approved(at()), &Decision::Undecided);
        assert_eq!(status, LeaveStatus::Pending);
    }

    #[test]
    fn test_status_rejected_by_manager() {
        let manager = Decision::rejected(at(), "no coverage on that week at all");
        let status = derive_status(None, &manager, &Decision::Undecided);
        assert_eq!(status, LeaveStatus::Rejected);
    }

    #[test]
    fn test_status_requires_both_approvals() {
        let approved = Decision::approved(at());
        assert_eq!(derive_status(None, &approved, &approved), LeaveStatus::Approved);

        let hr = Decision::rejected(at(), "budget freeze for the whole quarter");
        assert_eq!(derive_status(None, &approved, &hr), LeaveStatus::Rejected);
    }

    #[test]
    fn test_closure_wins_over_decisions() {
        let closure = AutoClosure {
            at: at(),
            reason: "closed".into(),
        };
        let approved = Decision::approved(at());
        assert_eq!(
            derive_status(Some(&closure), &approved, &Decision::Undecided),
            LeaveStatus::Closed
        );
    }

    #[test]
    fn test_decision_column_mapping() {
        let rejected = Decision::rejected(at(), "reason");
        let (approved, when, reason) = rejected.to_columns();
        assert_eq!(Decision::from_columns(approved, when, reason), rejected);
        assert_eq!(
            Decision::from_columns(None, None, None),
            Decision::Undecided
        );
    }

    #[test]
    fn test_leave_type_parses_case_insensitively() {
        assert_eq!("annual".parse::<LeaveType>().unwrap(), LeaveType::Annual);
        assert!("vacation".parse::<LeaveType>().is_err());
        assert!(!LeaveType::Sick.consumes_quota());
    }
}
