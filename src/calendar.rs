//! Date arithmetic in the company's fixed time zone.
//!
//! Every weekend / working-day decision in the crate goes through these
//! helpers so that a request made from another zone still lands on the same
//! calendar days.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Number of Monday-to-Friday days in `[from, to]`, both ends included.
pub fn count_working_days(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return 0;
    }

    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| !is_weekend(*day))
        .count() as i64
}

pub fn contains_weekday(from: NaiveDate, to: NaiveDate) -> bool {
    count_working_days(from, to) > 0
}

/// The first working day on or after `date`.
pub fn next_working_day(date: NaiveDate) -> NaiveDate {
    date.iter_days()
        .find(|day| !is_weekend(*day))
        .unwrap_or(date)
}

/// Last date of a block holding `count` working days, counted from `start`
/// (included when it is itself a working day). `count` below one yields `start`.
pub fn working_day_block_end(start: NaiveDate, count: i64) -> NaiveDate {
    if count < 1 {
        return start;
    }

    let mut seen = 0;
    let mut last = start;
    for day in start.iter_days() {
        if !is_weekend(day) {
            seen += 1;
            last = day;
            if seen == count {
                break;
            }
        }
    }
    last
}

/// Monday and Sunday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = date.weekday().num_days_from_monday() as u64;
    let monday = date.checked_sub_days(Days::new(offset)).unwrap_or(date);
    let sunday = monday.checked_add_days(Days::new(6)).unwrap_or(date);
    (monday, sunday)
}

/// Whole calendar days from `today` until `date` (negative when in the past).
pub fn days_until(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// The instant `time` happens on `date` in `tz`.
pub fn at_time(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Wall clock time skipped by a DST jump; treat it as UTC.
        None => Utc.from_utc_datetime(&naive),
    }
}

pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    at_time(date, NaiveTime::MIN, tz)
}

pub fn end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    at_time(date, last_second, tz)
}

/// Calendar date of `instant` as seen in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_count_working_days_skips_weekends() {
        // 2024-01-01 is a Monday.
        assert_eq!(count_working_days(date(2024, 1, 1), date(2024, 1, 7)), 5);
        assert_eq!(count_working_days(date(2024, 1, 1), date(2024, 1, 18)), 14);
        assert_eq!(count_working_days(date(2024, 1, 6), date(2024, 1, 7)), 0);
        assert_eq!(count_working_days(date(2024, 1, 5), date(2024, 1, 1)), 0);
    }

    #[test]
    fn test_block_end_spans_weekends() {
        // Friday plus two working days ends on Tuesday.
        assert_eq!(working_day_block_end(date(2024, 1, 5), 3), date(2024, 1, 9));
        // Starting on Saturday counts from Monday.
        assert_eq!(working_day_block_end(date(2024, 1, 6), 1), date(2024, 1, 8));
    }

    #[test]
    fn test_next_working_day() {
        assert_eq!(next_working_day(date(2024, 1, 6)), date(2024, 1, 8));
        assert_eq!(next_working_day(date(2024, 1, 3)), date(2024, 1, 3));
    }

    #[test]
    fn test_week_bounds() {
        let (monday, sunday) = week_bounds(date(2024, 1, 10));
        assert_eq!(monday, date(2024, 1, 8));
        assert_eq!(sunday, date(2024, 1, 14));
    }

    #[test]
    fn test_at_time_uses_zone_offset() {
        let tz: Tz = "Asia/Jakarta".parse().unwrap();
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let instant = at_time(date(2024, 1, 8), eight, tz);
        assert_eq!(instant.to_rfc3339(), "2024-01-08T01:00:00+00:00");
        assert_eq!(local_date(instant, tz), date(2024, 1, 8));
    }
}
