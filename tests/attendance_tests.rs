use chrono::Duration;
use pretty_assertions::assert_eq;

use worktime::database::models::{
    ClockInRequest, ClockOutRequest, Decision, EmployeeStatus, GeoPoint, LeaveRequest, LeaveType,
};
use worktime::services::NotificationKind;

mod common;
use common::{TestApp, date, local, office};

#[tokio::test]
async fn test_clock_in_within_interval_is_not_late() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let attendance = app.clock_in_at(&employee, local(2024, 1, 8, 8, 5)).await;

    assert!(!attendance.late_clock_in);
    assert!(attendance.is_active());
    assert_eq!(
        app.store.employee(employee.id).unwrap().status,
        EmployeeStatus::Available
    );
}

#[tokio::test]
async fn test_clock_in_after_interval_is_late() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let attendance = app.clock_in_at(&employee, local(2024, 1, 8, 8, 35)).await;

    assert!(attendance.late_clock_in);
}

#[tokio::test]
async fn test_code_is_mailed_even_with_live_subscribers() {
    let app = TestApp::with_subscribers(local(2024, 1, 8, 7, 30), 1);
    let manager = app.manager();
    let employee = app.staff(&manager);

    let deadline = app
        .state
        .attendance
        .request_clock_in(employee.id)
        .await
        .unwrap();

    assert_eq!(deadline, local(2024, 1, 8, 16, 30));
    assert_eq!(app.mailed_code(&employee).len(), 6);
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_code_is_single_use_and_bound_to_employee() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let colleague = app.staff(&manager);

    app.state
        .attendance
        .request_clock_in(employee.id)
        .await
        .unwrap();
    let code = app.mailed_code(&employee);

    let wrong_employee = app
        .state
        .attendance
        .clock_in(
            colleague.id,
            ClockInRequest {
                code: code.clone(),
                location: office(),
            },
        )
        .await;
    assert!(wrong_employee.is_err());

    app.state
        .attendance
        .clock_in(
            employee.id,
            ClockInRequest {
                code: code.clone(),
                location: office(),
            },
        )
        .await
        .unwrap();

    let again = app.state.attendance.request_clock_in(employee.id).await;
    assert!(again.unwrap_err().to_string().contains("already clocked in"));
}

#[tokio::test]
async fn test_wrong_code_is_rejected() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    app.state
        .attendance
        .request_clock_in(employee.id)
        .await
        .unwrap();

    let result = app
        .state
        .attendance
        .clock_in(
            employee.id,
            ClockInRequest {
                code: "abcdef".to_string(),
                location: office(),
            },
        )
        .await;

    assert!(result.unwrap_err().to_string().contains("invalid or expired"));
    assert!(app.state.attendance.todays_attendance(employee.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_clock_in_closes_at_deadline() {
    let app = TestApp::at(local(2024, 1, 8, 16, 31));
    let manager = app.manager();
    let employee = app.staff(&manager);

    let result = app.state.attendance.request_clock_in(employee.id).await;

    assert!(result.unwrap_err().to_string().contains("no longer accepted"));
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_employee_on_approved_leave_cannot_clock_in() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let at = local(2024, 1, 1, 9, 0);
    app.store.insert_leave(LeaveRequest {
        id: uuid::Uuid::new_v4(),
        employee_id: employee.id,
        from: date(2024, 1, 8),
        to: date(2024, 1, 9),
        leave_type: LeaveType::Annual,
        reason: "Visiting family out of town".to_string(),
        parent_id: None,
        children: Vec::new(),
        manager_id: Some(manager.id),
        hr_id: Some(manager.id),
        manager_decision: Decision::approved(at),
        hr_decision: Decision::approved(at),
        closed_automatically: None,
        created_at: at,
    });

    let result = app.state.attendance.request_clock_in(employee.id).await;

    assert!(result.unwrap_err().to_string().contains("on leave"));
}

#[tokio::test]
async fn test_clock_out_too_far_is_rejected() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 8, 0)).await;
    app.set_now(local(2024, 1, 8, 17, 0));

    // Roughly 120 km away.
    let result = app
        .state
        .attendance
        .clock_out(
            employee.id,
            ClockOutRequest {
                location: GeoPoint::new(-6.9175, 107.6191),
                confirm_overtime: false,
                reason: None,
            },
        )
        .await;

    assert!(result.unwrap_err().to_string().contains("too far"));
    let session = app.state.attendance.todays_attendance(employee.id).await.unwrap();
    assert!(session.unwrap().is_active());
}

#[tokio::test]
async fn test_eleven_hour_day_records_two_hours_of_overtime() {
    let app = TestApp::at(local(2024, 1, 8, 6, 50));
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 7, 0)).await;
    app.set_now(local(2024, 1, 8, 18, 0));

    let preview = app
        .state
        .attendance
        .request_clock_out(employee.id)
        .await
        .unwrap();
    assert!(preview.is_overtime);
    assert_eq!(preview.overtime_accepted_duration, Duration::hours(2));

    let attendance = app.clock_out(&employee, true).await;

    assert!(attendance.done_for_the_day);
    assert!(!attendance.early_clock_out);
    let overtime = attendance.overtime.unwrap();
    assert_eq!(overtime.duration, Duration::hours(2));
    assert_eq!(overtime.manager_id, manager.id);
    assert!(overtime.manager_decision.is_undecided());

    assert_eq!(app.store.overtime(overtime.id).unwrap().attendance_id, attendance.id);
    assert_eq!(
        app.notifier.sent_of(NotificationKind::OvertimeSubmitted).len(),
        1
    );
}

#[tokio::test]
async fn test_unconfirmed_overtime_is_not_recorded() {
    let app = TestApp::at(local(2024, 1, 8, 6, 50));
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 7, 0)).await;
    app.set_now(local(2024, 1, 8, 18, 0));

    let attendance = app.clock_out(&employee, false).await;

    assert!(attendance.overtime.is_none());
    assert_eq!(app.store.overtime_count(), 0);
}

#[tokio::test]
async fn test_overtime_reason_is_validated() {
    let app = TestApp::at(local(2024, 1, 8, 6, 50));
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 7, 0)).await;
    app.set_now(local(2024, 1, 8, 18, 0));

    let result = app
        .state
        .attendance
        .clock_out(
            employee.id,
            ClockOutRequest {
                location: office(),
                confirm_overtime: true,
                reason: Some("late".to_string()),
            },
        )
        .await;

    assert!(result.is_err());
    assert_eq!(app.store.overtime_count(), 0);
    let session = app.state.attendance.todays_attendance(employee.id).await.unwrap();
    assert!(session.unwrap().is_active());
}

#[tokio::test]
async fn test_leaving_before_interval_is_early() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 8, 0)).await;

    app.set_now(local(2024, 1, 8, 15, 0));
    let attendance = app.clock_out(&employee, false).await;

    assert!(attendance.early_clock_out);
}

#[tokio::test]
async fn test_leaving_inside_interval_is_not_early() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.clock_in_at(&employee, local(2024, 1, 8, 8, 0)).await;

    app.set_now(local(2024, 1, 8, 16, 45));
    let attendance = app.clock_out(&employee, false).await;

    assert!(!attendance.early_clock_out);
}

#[tokio::test]
async fn test_managers_never_accrue_overtime() {
    let app = TestApp::at(local(2024, 1, 8, 6, 50));
    let manager = app.manager();
    app.clock_in_at(&manager, local(2024, 1, 8, 7, 0)).await;
    app.set_now(local(2024, 1, 8, 20, 0));

    let report = app
        .state
        .attendance
        .request_clock_out(manager.id)
        .await
        .unwrap();
    assert!(!report.is_overtime);

    let attendance = app.clock_out(&manager, true).await;
    assert!(attendance.overtime.is_none());
    assert_eq!(app.store.overtime_count(), 0);
}

#[tokio::test]
async fn test_weekend_session_counts_entirely_as_overtime() {
    // Saturday.
    let app = TestApp::at(local(2024, 1, 13, 9, 50));
    let manager = app.manager();
    let employee = app.staff(&manager);
    let attendance = app.clock_in_at(&employee, local(2024, 1, 13, 10, 0)).await;
    assert!(!attendance.late_clock_in);

    app.set_now(local(2024, 1, 13, 12, 0));
    let attendance = app.clock_out(&employee, true).await;

    assert!(!attendance.early_clock_out);
    assert_eq!(attendance.overtime.unwrap().duration, Duration::hours(2));
}

#[tokio::test]
async fn test_clock_out_without_session_fails() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let result = app
        .state
        .attendance
        .clock_out(
            employee.id,
            ClockOutRequest {
                location: office(),
                confirm_overtime: false,
                reason: None,
            },
        )
        .await;

    assert!(result.unwrap_err().to_string().contains("not clocked in"));
}
