use chrono::{Datelike, Days, NaiveDate};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::calendar;
use crate::database::models::{Employee, Period, TimeWindow};
use crate::error::{AppError, AppResult};

pub const EARLIEST_HISTORY_YEAR: i32 = 2000;

/// Trimmed length of `reason` must fall in `min..=max` characters.
pub fn validate_reason(reason: &str, min: usize, max: usize) -> AppResult<()> {
    let length = reason.trim().chars().count();
    if length < min || length > max {
        return Err(AppError::domain(
            "Reason",
            format!("reason must be between {} and {} characters", min, max),
        ));
    }
    Ok(())
}

/// UTC window for `period` in `tz`; `None` means unbounded.
pub fn resolve_period(period: &Period, today: NaiveDate, tz: Tz) -> AppResult<Option<TimeWindow>> {
    match *period {
        Period::All => Ok(None),
        Period::Range { from, to } => {
            if from > to {
                return Err(AppError::domain(
                    "Period",
                    "start date must not be after end date",
                ));
            }
            let after = to
                .checked_add_days(Days::new(1))
                .ok_or_else(|| AppError::BadRequest("end date is out of range".to_string()))?;
            Ok(Some(TimeWindow {
                from: calendar::start_of_day(from, tz),
                to: calendar::start_of_day(after, tz),
            }))
        }
        Period::Month { year, month } => {
            if !(1..=12).contains(&month) {
                return Err(AppError::domain("Period", "month must be between 1 and 12"));
            }
            if year < EARLIEST_HISTORY_YEAR || year > today.year() {
                return Err(AppError::domain(
                    "Period",
                    format!(
                        "year must be between {} and {}",
                        EARLIEST_HISTORY_YEAR,
                        today.year()
                    ),
                ));
            }
            let (first, next) = month_bounds(year, month)
                .ok_or_else(|| AppError::BadRequest("invalid month".to_string()))?;
            Ok(Some(TimeWindow {
                from: calendar::start_of_day(first, tz),
                to: calendar::start_of_day(next, tz),
            }))
        }
    }
}

/// First day of the month and first day of the following one.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next))
}

pub fn ensure_staff_of(employee: &Employee, manager_id: Uuid) -> AppResult<()> {
    if employee.manager_id != Some(manager_id) {
        return Err(AppError::domain(
            "Employee",
            "the employee you're requesting to view is not your staff",
        ));
    }
    Ok(())
}
