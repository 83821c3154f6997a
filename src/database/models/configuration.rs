use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicy {
    pub office_start: NaiveTime,
    pub office_end: NaiveTime,
    /// Grace window around office hours, in minutes.
    pub acceptance_attendance_interval: i64,
    /// Minimum lead time for leave, in days.
    pub acceptance_leave_interval: i64,
    pub default_yearly_quota: i64,
    pub default_marriage_quota: i64,
    pub max_overtime_daily_hours: i64,
    pub max_overtime_weekly_hours: i64,
}

impl Default for ConfigurationPolicy {
    fn default() -> Self {
        Self {
            office_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            office_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            acceptance_attendance_interval: 30,
            acceptance_leave_interval: 7,
            default_yearly_quota: 12,
            default_marriage_quota: 3,
            max_overtime_daily_hours: 3,
            max_overtime_weekly_hours: 14,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConfigurationRow {
    pub office_start: NaiveTime,
    pub office_end: NaiveTime,
    pub acceptance_attendance_interval: i64,
    pub acceptance_leave_interval: i64,
    pub default_yearly_quota: i64,
    pub default_marriage_quota: i64,
    pub max_overtime_daily_hours: i64,
    pub max_overtime_weekly_hours: i64,
}

impl From<ConfigurationRow> for ConfigurationPolicy {
    fn from(row: ConfigurationRow) -> Self {
        ConfigurationPolicy {
            office_start: row.office_start,
            office_end: row.office_end,
            acceptance_attendance_interval: row.acceptance_attendance_interval,
            acceptance_leave_interval: row.acceptance_leave_interval,
            default_yearly_quota: row.default_yearly_quota,
            default_marriage_quota: row.default_marriage_quota,
            max_overtime_daily_hours: row.max_overtime_daily_hours,
            max_overtime_weekly_hours: row.max_overtime_weekly_hours,
        }
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum StagedSlot {
        NextDay => "NEXT_DAY",
        NextMonth => "NEXT_MONTH",
    }
}

/// Pending edits; `None` leaves the live value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedChanges {
    pub office_start: Option<NaiveTime>,
    pub office_end: Option<NaiveTime>,
    pub acceptance_attendance_interval: Option<i64>,
    pub acceptance_leave_interval: Option<i64>,
    pub default_yearly_quota: Option<i64>,
    pub default_marriage_quota: Option<i64>,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        *self == StagedChanges::default()
    }

    /// Overlays every set field onto `policy`.
    pub fn apply_to(&self, policy: &mut ConfigurationPolicy) {
        if let Some(v) = self.office_start {
            policy.office_start = v;
        }
        if let Some(v) = self.office_end {
            policy.office_end = v;
        }
        if let Some(v) = self.acceptance_attendance_interval {
            policy.acceptance_attendance_interval = v;
        }
        if let Some(v) = self.acceptance_leave_interval {
            policy.acceptance_leave_interval = v;
        }
        if let Some(v) = self.default_yearly_quota {
            policy.default_yearly_quota = v;
        }
        if let Some(v) = self.default_marriage_quota {
            policy.default_marriage_quota = v;
        }
    }

    /// Merges `later` over `self`, newer values winning.
    pub fn merge(&mut self, later: &StagedChanges) {
        self.office_start = later.office_start.or(self.office_start);
        self.office_end = later.office_end.or(self.office_end);
        self.acceptance_attendance_interval = later
            .acceptance_attendance_interval
            .or(self.acceptance_attendance_interval);
        self.acceptance_leave_interval = later
            .acceptance_leave_interval
            .or(self.acceptance_leave_interval);
        self.default_yearly_quota = later.default_yearly_quota.or(self.default_yearly_quota);
        self.default_marriage_quota = later
            .default_marriage_quota
            .or(self.default_marriage_quota);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub prev: serde_json::Value,
    pub new: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationChangeLog {
    pub id: Uuid,
    pub changed_by: Uuid,
    pub slot: StagedSlot,
    pub changes: Vec<FieldChange>,
    pub effective_from: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
