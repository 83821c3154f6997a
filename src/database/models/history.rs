use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LeaveStatus, LeaveType, OvertimeStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Time frame a history listing is narrowed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Period {
    /// Inclusive range of local days.
    Range { from: NaiveDate, to: NaiveDate },
    Month { year: i32, month: u32 },
    #[default]
    All,
}

/// Half-open `[from, to)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant < self.to
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: &PageRequest, total: u64) -> Self {
        let per_page = request.per_page();
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(u64::from(per_page))
        };
        Self {
            items,
            page: request.page(),
            per_page,
            total,
            total_pages,
        }
    }

    /// Cuts the requested page out of a list that is already filtered and ordered.
    pub fn slice(all: Vec<T>, request: &PageRequest) -> Self {
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.per_page() as usize)
            .collect();
        Self::new(items, request, total)
    }
}

/// Whose records a history listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope {
    Employee(Uuid),
    /// Everyone reporting to this manager.
    StaffOf(Uuid),
    All,
}

/// Finished attendance sessions, newest clock-in first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub scope: HistoryScope,
    pub window: Option<TimeWindow>,
    pub late_only: bool,
    pub early_only: bool,
    pub closed_only: bool,
}

/// Overtime submissions, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvertimeFilter {
    pub scope: HistoryScope,
    pub window: Option<TimeWindow>,
    pub status: Option<OvertimeStatus>,
    /// Skip rows still waiting on the manager.
    pub settled_only: bool,
}

/// Leave groups by their root, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveFilter {
    pub scope: HistoryScope,
    pub window: Option<TimeWindow>,
    pub status: Option<LeaveStatus>,
    /// Skip roots the manager has not acted on, unless auto-closed.
    pub settled_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceHistoryQuery {
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub page: PageRequest,
    #[serde(default)]
    pub late_clock_in: bool,
    #[serde(default)]
    pub early_clock_out: bool,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveHistoryQuery {
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub page: PageRequest,
    pub status: Option<LeaveStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeHistoryQuery {
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub page: PageRequest,
    pub status: Option<OvertimeStatus>,
}

/// One approved absence on a day of the leave calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveCalendarEntry {
    pub leave_id: Uuid,
    pub employee_id: Uuid,
    pub full_name: String,
    pub leave_type: LeaveType,
}
