#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use uuid::Uuid;

use worktime::calendar;
use worktime::clock::FixedClock;
use worktime::database::models::*;
use worktime::services::{ClockInCodes, NotificationKind, NotificationService};
use worktime::test_utils::{MemoryStore, RecordingMailer, RecordingNotifier};
use worktime::{AppState, Stores};

pub const JAKARTA: &str = "Asia/Jakarta";

pub fn tz() -> Tz {
    JAKARTA.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Wall-clock time in the company zone.
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    calendar::at_time(date(y, m, d), NaiveTime::from_hms_opt(h, min, 0).unwrap(), tz())
}

pub fn office() -> GeoPoint {
    GeoPoint::new(-6.2088, 106.8456)
}

pub fn setup_test_env() {
    unsafe {
        env::set_var("RUST_LOG", "debug");
    }
    let _ = env_logger::builder().is_test(true).try_init();
}

// Test application wrapper
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: RecordingNotifier,
    pub mailer: RecordingMailer,
    pub state: AppState,
}

impl TestApp {
    /// Monday 2024-01-08, 07:30 in Jakarta, nobody subscribed to live updates.
    pub fn new() -> Self {
        Self::build(local(2024, 1, 8, 7, 30), 0)
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self::build(now, 0)
    }

    pub fn with_subscribers(now: DateTime<Utc>, subscribers: usize) -> Self {
        Self::build(now, subscribers)
    }

    fn build(now: DateTime<Utc>, subscribers: usize) -> Self {
        setup_test_env();

        let store = Arc::new(MemoryStore::new());
        store.set_policy(ConfigurationPolicy::default());

        let clock = Arc::new(FixedClock::new(tz(), now));
        let notifier = RecordingNotifier::with_subscribers(subscribers);
        let mailer = RecordingMailer::default();

        let notifications =
            NotificationService::new(Arc::new(notifier.clone()), Arc::new(mailer.clone()));
        let state = AppState::new(
            Stores::shared(store.clone()),
            notifications,
            ClockInCodes::default(),
            clock.clone(),
        );

        Self {
            store,
            clock,
            notifier,
            mailer,
            state,
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    fn employee(&self, manager_id: Option<Uuid>, contract_type: ContractType) -> Employee {
        let employee = Employee {
            id: Uuid::new_v4(),
            full_name: Name().fake(),
            email: SafeEmail().fake(),
            manager_id,
            status: EmployeeStatus::Unavailable,
            contract_type,
        };
        self.store.insert_employee(employee.clone());
        self.store.set_biodata(employee.id, false);
        self.store
            .set_quota(LeaveQuota::new(employee.id, 12, 3));
        employee
    }

    /// A manager or HR member: no manager of their own.
    pub fn manager(&self) -> Employee {
        self.employee(None, ContractType::FullTime)
    }

    pub fn staff(&self, manager: &Employee) -> Employee {
        self.employee(Some(manager.id), ContractType::FullTime)
    }

    pub fn intern(&self, manager: &Employee) -> Employee {
        self.employee(Some(manager.id), ContractType::Intern)
    }

    pub fn quota(&self, employee: &Employee) -> LeaveQuota {
        self.store.quota(employee.id).unwrap()
    }

    pub fn set_quota(&self, employee: &Employee, yearly: i64, marriage: i64) {
        self.store
            .set_quota(LeaveQuota::new(employee.id, yearly, marriage));
    }

    /// Latest clock-in code mailed to `employee`.
    pub fn mailed_code(&self, employee: &Employee) -> String {
        self.mailer
            .sent_to(&employee.email)
            .into_iter()
            .rev()
            .find(|m| m.template == NotificationKind::ClockInCode.template())
            .and_then(|m| m.data["code"].as_str().map(str::to_string))
            .expect("no clock-in code was mailed")
    }

    /// Requests a code at the current time and clocks in with it at `at`.
    pub async fn clock_in_at(&self, employee: &Employee, at: DateTime<Utc>) -> Attendance {
        self.state
            .attendance
            .request_clock_in(employee.id)
            .await
            .unwrap();
        let code = self.mailed_code(employee);
        self.set_now(at);
        self.state
            .attendance
            .clock_in(
                employee.id,
                ClockInRequest {
                    code,
                    location: office(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn clock_out(&self, employee: &Employee, confirm_overtime: bool) -> Attendance {
        self.state
            .attendance
            .clock_out(
                employee.id,
                ClockOutRequest {
                    location: office(),
                    confirm_overtime,
                    reason: Some("Finishing the quarterly report".to_string()),
                },
            )
            .await
            .unwrap()
    }
}

pub fn application(
    from: NaiveDate,
    to: NaiveDate,
    leave_type: LeaveType,
) -> LeaveApplication {
    LeaveApplication {
        from,
        to,
        leave_type: Some(leave_type),
        reason: "Family trip planned well in advance".to_string(),
    }
}

pub fn decision(application: LeaveApplication, overflows: &[(LeaveType, i64)]) -> LeaveDecision {
    LeaveDecision {
        application,
        overflows: overflows
            .iter()
            .map(|(leave_type, days)| OverflowChoice {
                leave_type: *leave_type,
                days: *days,
            })
            .collect(),
    }
}

pub fn approve(leave_id: Uuid, children: &[(Uuid, bool)]) -> LeaveAction {
    LeaveAction {
        leave_id,
        approve: true,
        rejection_reason: None,
        children: children
            .iter()
            .map(|(id, approve)| BlockVerdict {
                leave_id: *id,
                approve: *approve,
                rejection_reason: (!approve)
                    .then(|| "Overflow days clash with the team release".to_string()),
            })
            .collect(),
    }
}

pub fn reject(leave_id: Uuid) -> LeaveAction {
    LeaveAction {
        leave_id,
        approve: false,
        rejection_reason: Some("The team is short-staffed during this period".to_string()),
        children: Vec::new(),
    }
}
