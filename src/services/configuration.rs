use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::calendar;
use crate::clock::Clock;
use crate::database::{
    models::{
        ConfigurationChangeLog, ConfigurationPolicy, FieldChange, LeaveType, StagedChanges,
        StagedSlot,
    },
    stores::ConfigStore,
};
use crate::error::{AppError, AppResult};

/// How the lead time before a leave start is compared with the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadTimeRule {
    /// `days_until >= minimum`
    AtLeast,
    /// `days_until > minimum`
    MoreThan,
}

impl LeadTimeRule {
    pub fn is_satisfied(&self, days_until: i64, minimum: i64) -> bool {
        match self {
            LeadTimeRule::AtLeast => days_until >= minimum,
            LeadTimeRule::MoreThan => days_until > minimum,
        }
    }
}

impl ConfigurationPolicy {
    pub fn office_work_duration(&self) -> Duration {
        self.office_end - self.office_start
    }

    pub fn office_start_on(&self, date: NaiveDate, tz: Tz) -> DateTime<Utc> {
        calendar::at_time(date, self.office_start, tz)
    }

    pub fn office_end_on(&self, date: NaiveDate, tz: Tz) -> DateTime<Utc> {
        calendar::at_time(date, self.office_end, tz)
    }

    pub fn acceptance_interval(&self) -> Duration {
        Duration::minutes(self.acceptance_attendance_interval)
    }

    pub fn max_overtime_daily(&self) -> Duration {
        Duration::hours(self.max_overtime_daily_hours)
    }

    pub fn max_overtime_weekly(&self) -> Duration {
        Duration::hours(self.max_overtime_weekly_hours)
    }

    pub fn lead_time_rule(&self, leave_type: LeaveType) -> Option<LeadTimeRule> {
        match leave_type {
            LeaveType::Marriage => Some(LeadTimeRule::MoreThan),
            LeaveType::Annual | LeaveType::Unpaid => Some(LeadTimeRule::AtLeast),
            LeaveType::Sick => None,
        }
    }

    /// Which staging slot a field belongs to.
    fn slot_of(field: &str) -> StagedSlot {
        match field {
            "officeStart" | "officeEnd" | "acceptanceAttendanceInterval" => StagedSlot::NextDay,
            _ => StagedSlot::NextMonth,
        }
    }
}

#[derive(Clone)]
pub struct ConfigurationService {
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
}

impl ConfigurationService {
    pub fn new(store: Arc<dyn ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn current(&self) -> AppResult<ConfigurationPolicy> {
        match self.store.get().await? {
            Some(policy) => Ok(policy),
            None => {
                log::warn!("No configuration stored, using defaults");
                Ok(ConfigurationPolicy::default())
            }
        }
    }

    pub async fn staged(&self, slot: StagedSlot) -> AppResult<Option<StagedChanges>> {
        Ok(self.store.get_staged(slot).await?)
    }

    pub async fn change_logs(&self) -> AppResult<Vec<ConfigurationChangeLog>> {
        Ok(self.store.change_logs().await?)
    }

    /// Stages an HR edit. Office-hour fields take effect the next day, leave
    /// and quota fields the next month. Returns one log per touched slot.
    pub async fn stage_changes(
        &self,
        changed_by: Uuid,
        payload: StagedChanges,
    ) -> AppResult<Vec<ConfigurationChangeLog>> {
        let live = self.current().await?;
        validate_payload(&live, &payload)?;

        let mut next_day = (StagedChanges::default(), Vec::new());
        let mut next_month = (StagedChanges::default(), Vec::new());

        macro_rules! diff {
            ($field:ident, $name:literal) => {
                if let Some(value) = payload.$field {
                    if value != live.$field {
                        let change = field_change($name, &live.$field, &value);
                        let target = match ConfigurationPolicy::slot_of($name) {
                            StagedSlot::NextDay => &mut next_day,
                            StagedSlot::NextMonth => &mut next_month,
                        };
                        target.0.$field = Some(value);
                        target.1.push(change);
                    }
                }
            };
        }

        diff!(office_start, "officeStart");
        diff!(office_end, "officeEnd");
        diff!(acceptance_attendance_interval, "acceptanceAttendanceInterval");
        diff!(acceptance_leave_interval, "acceptanceLeaveInterval");
        diff!(default_yearly_quota, "defaultYearlyQuota");
        diff!(default_marriage_quota, "defaultMarriageQuota");

        let now = self.clock.now();
        let today = self.clock.today();
        let tz = self.clock.timezone();
        let mut logs = Vec::new();

        for (slot, (changes, fields)) in [
            (StagedSlot::NextDay, next_day),
            (StagedSlot::NextMonth, next_month),
        ] {
            if fields.is_empty() {
                continue;
            }

            let log = ConfigurationChangeLog {
                id: Uuid::new_v4(),
                changed_by,
                slot,
                changes: fields,
                effective_from: effective_from(slot, today, tz),
                created_at: now,
            };
            self.store.stage(slot, &changes, &log).await?;

            log::info!(
                "Employee {} staged {} configuration change(s) for {}",
                changed_by,
                log.changes.len(),
                slot
            );
            logs.push(log);
        }

        Ok(logs)
    }

    /// Moves a staged slot into the live policy.
    pub async fn apply_staged(&self, slot: StagedSlot) -> AppResult<bool> {
        let applied = self.store.apply_staged(slot).await?;
        if applied {
            log::info!("Applied staged {} configuration", slot);
        }
        Ok(applied)
    }
}

fn field_change<T: Serialize>(name: &str, prev: &T, new: &T) -> FieldChange {
    FieldChange {
        field: name.to_string(),
        prev: serde_json::to_value(prev).unwrap_or(serde_json::Value::Null),
        new: serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
    }
}

fn validate_payload(live: &ConfigurationPolicy, payload: &StagedChanges) -> AppResult<()> {
    let mut resulting = live.clone();
    payload.apply_to(&mut resulting);

    if resulting.office_start >= resulting.office_end {
        return Err(AppError::domain(
            "Configuration",
            "office start time must be before office end time",
        ));
    }

    let intervals = [
        resulting.acceptance_attendance_interval,
        resulting.acceptance_leave_interval,
        resulting.default_yearly_quota,
        resulting.default_marriage_quota,
    ];
    if intervals.iter().any(|v| *v < 0) {
        return Err(AppError::domain(
            "Configuration",
            "intervals and quotas cannot be negative",
        ));
    }

    if resulting.acceptance_interval() * 2 >= resulting.office_work_duration() {
        return Err(AppError::domain(
            "Configuration",
            "attendance interval does not fit inside office hours",
        ));
    }

    Ok(())
}

fn effective_from(slot: StagedSlot, today: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let date = match slot {
        StagedSlot::NextDay => today.succ_opt().unwrap_or(today),
        StagedSlot::NextMonth => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
        }
    };
    calendar::start_of_day(date, tz)
}
