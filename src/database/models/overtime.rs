use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;
use super::{AutoClosure, Decision};

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum OvertimeStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Closed => "CLOSED",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overtime {
    pub id: Uuid,
    pub attendance_id: Uuid,
    pub employee_id: Uuid,
    pub manager_id: Uuid,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    pub reason: String,
    pub manager_decision: Decision,
    pub closed_automatically: Option<AutoClosure>,
    pub created_at: DateTime<Utc>,
}

impl Overtime {
    /// Counts toward the weekly budget: pending or approved, never auto-closed.
    pub fn counts_toward_week(&self) -> bool {
        self.closed_automatically.is_none() && !self.manager_decision.is_rejected()
    }

    pub fn is_open(&self) -> bool {
        self.closed_automatically.is_none() && self.manager_decision.is_undecided()
    }

    pub fn status(&self) -> OvertimeStatus {
        match (&self.closed_automatically, &self.manager_decision) {
            (Some(_), _) => OvertimeStatus::Closed,
            (None, Decision::Undecided) => OvertimeStatus::Pending,
            (None, Decision::Approved { .. }) => OvertimeStatus::Approved,
            (None, Decision::Rejected { .. }) => OvertimeStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OvertimeRow {
    pub id: Uuid,
    pub attendance_id: Uuid,
    pub employee_id: Uuid,
    pub manager_id: Uuid,
    pub duration_seconds: i64,
    pub reason: String,
    pub approved_by_manager: Option<bool>,
    pub action_by_manager_at: Option<DateTime<Utc>>,
    pub manager_rejection_reason: Option<String>,
    pub closed_automatically_at: Option<DateTime<Utc>>,
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OvertimeRow> for Overtime {
    fn from(row: OvertimeRow) -> Self {
        Overtime {
            id: row.id,
            attendance_id: row.attendance_id,
            employee_id: row.employee_id,
            manager_id: row.manager_id,
            duration: Duration::seconds(row.duration_seconds),
            reason: row.reason,
            manager_decision: Decision::from_columns(
                row.approved_by_manager,
                row.action_by_manager_at,
                row.manager_rejection_reason,
            ),
            closed_automatically: row.closed_automatically_at.map(|at| AutoClosure {
                at,
                reason: row.closed_reason.unwrap_or_default(),
            }),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeAction {
    pub overtime_id: Uuid,
    pub approve: bool,
    pub rejection_reason: Option<String>,
}

/// Outcome of the overtime calculation for a closing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeReport {
    pub is_overtime: bool,
    pub is_on_holiday: bool,
    pub is_overtime_leakage: bool,
    pub is_overtime_available: bool,
    #[serde(with = "duration_seconds")]
    pub overtime_duration: Duration,
    #[serde(with = "duration_seconds")]
    pub overtime_weekly_total_duration: Duration,
    #[serde(with = "duration_seconds")]
    pub overtime_accepted_duration: Duration,
    #[serde(with = "duration_seconds")]
    pub max_allowed_daily_duration: Duration,
    #[serde(with = "duration_seconds")]
    pub max_allowed_weekly_duration: Duration,
}

impl OvertimeReport {
    /// An overtime row is written only when there is something to accept.
    pub fn should_create_record(&self) -> bool {
        self.is_on_holiday || self.overtime_accepted_duration > Duration::zero()
    }
}

pub(crate) mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::seconds)
    }
}
