use pretty_assertions::assert_eq;

use worktime::database::models::{Employee, LeaveRequest, LeaveStatus, LeaveType};
use worktime::error::AppError;
use worktime::services::NotificationKind;
use worktime::services::leave_approval::CASCADE_REJECTION_REASON;

mod common;
use common::{TestApp, application, approve, date, decision, reject};

/// Nine working days of marriage leave against a balance of three, with the
/// excess split into two annual days and four unpaid days.
async fn marriage_with_two_overflows(app: &TestApp, employee: &Employee) -> LeaveRequest {
    app.state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 1), LeaveType::Marriage),
                &[(LeaveType::Annual, 2), (LeaveType::Unpaid, 4)],
            ),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_group_layout_for_two_overflows() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let group = marriage_with_two_overflows(&app, &employee).await;

    assert_eq!(group.to, date(2024, 1, 24));
    assert_eq!(group.children[0].leave_type, LeaveType::Annual);
    assert_eq!(group.children[0].from, date(2024, 1, 25));
    assert_eq!(group.children[0].to, date(2024, 1, 26));
    assert_eq!(group.children[1].leave_type, LeaveType::Unpaid);
    assert_eq!(group.children[1].from, date(2024, 1, 29));
    assert_eq!(group.children[1].to, date(2024, 2, 1));
    assert_eq!(group.total_duration(), 9);

    let quota = app.quota(&employee);
    assert_eq!(quota.marriage_count, 0);
    assert_eq!(quota.yearly_count, 10);
    assert_eq!(quota.unpaid_count, 361);
}

#[tokio::test]
async fn test_manager_rejection_cascades_and_releases_every_block() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let decided = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, reject(group.id))
        .await
        .unwrap();

    assert_eq!(decided.status(), LeaveStatus::Rejected);
    for child in &decided.children {
        assert_eq!(child.status(), LeaveStatus::Rejected);
        assert_eq!(
            child.manager_decision.rejection_reason(),
            Some(CASCADE_REJECTION_REASON)
        );
    }

    let quota = app.quota(&employee);
    assert_eq!(quota.marriage_count, 3);
    assert_eq!(quota.yearly_count, 12);
    assert_eq!(quota.unpaid_count, 365);

    let stored = app.store.leave(group.id).unwrap();
    assert!(stored.children.iter().all(|c| c.manager_decision.is_rejected()));

    assert_eq!(app.notifier.sent_of(NotificationKind::LeaveDecided).len(), 1);
    assert_eq!(app.mailer.sent_to(&employee.email).len(), 1);
}

#[tokio::test]
async fn test_rejection_needs_a_reason() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let mut action = reject(group.id);
    action.rejection_reason = Some("no".to_string());

    let result = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, action)
        .await;

    assert!(result.unwrap_err().is_domain());
    assert!(app.store.leave(group.id).unwrap().manager_decision.is_undecided());
}

#[tokio::test]
async fn test_approval_needs_a_verdict_per_overflow() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let missing = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, approve(group.id, &[(group.children[0].id, true)]))
        .await;
    assert!(missing.unwrap_err().to_string().contains("exactly one decision"));

    let stray = app
        .state
        .leave_approval
        .decide_as_manager(
            manager.id,
            approve(
                group.id,
                &[
                    (group.children[0].id, true),
                    (group.children[1].id, true),
                    (uuid::Uuid::new_v4(), true),
                ],
            ),
        )
        .await;
    assert!(stray.is_err());

    // Neither attempt left anything behind.
    let stored = app.store.leave(group.id).unwrap();
    assert!(stored.manager_decision.is_undecided());
    assert!(stored.children.iter().all(|c| c.manager_decision.is_undecided()));
}

#[tokio::test]
async fn test_partial_approval_then_hr_approval() {
    let app = TestApp::new();
    let manager = app.manager();
    let hr = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;
    let annual = group.children[0].id;
    let unpaid = group.children[1].id;

    let decided = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, approve(group.id, &[(annual, true), (unpaid, false)]))
        .await
        .unwrap();
    assert!(decided.manager_decision.is_approved());
    assert_eq!(decided.child(unpaid).unwrap().status(), LeaveStatus::Rejected);

    // Only the rejected overflow is given back.
    let quota = app.quota(&employee);
    assert_eq!(quota.marriage_count, 0);
    assert_eq!(quota.yearly_count, 10);
    assert_eq!(quota.unpaid_count, 365);

    let incoming = app.state.leave_requests.incoming_for_hr().await.unwrap();
    assert_eq!(incoming.len(), 1);

    // The rejected overflow is no longer HR's to decide.
    let stray = app
        .state
        .leave_approval
        .decide_as_hr(hr.id, approve(group.id, &[(annual, true), (unpaid, true)]))
        .await;
    assert!(stray.is_err());

    let approved = app
        .state
        .leave_approval
        .decide_as_hr(hr.id, approve(group.id, &[(annual, true)]))
        .await
        .unwrap();
    assert_eq!(approved.status(), LeaveStatus::Approved);
    assert_eq!(approved.child(annual).unwrap().status(), LeaveStatus::Approved);
    assert_eq!(approved.hr_id, Some(hr.id));

    let stored = app.store.leave(group.id).unwrap();
    assert_eq!(stored.status(), LeaveStatus::Approved);
    assert_eq!(stored.hr_id, Some(hr.id));
    assert_eq!(app.quota(&employee).yearly_count, 10);
}

#[tokio::test]
async fn test_hr_rejection_releases_quota() {
    let app = TestApp::new();
    let manager = app.manager();
    let hr = app.manager();
    let employee = app.staff(&manager);

    let group = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 26), LeaveType::Annual),
                &[],
            ),
        )
        .await
        .unwrap();
    assert_eq!(app.quota(&employee).yearly_count, 7);

    app.state
        .leave_approval
        .decide_as_manager(manager.id, approve(group.id, &[]))
        .await
        .unwrap();
    let decided = app
        .state
        .leave_approval
        .decide_as_hr(hr.id, reject(group.id))
        .await
        .unwrap();

    assert_eq!(decided.status(), LeaveStatus::Rejected);
    assert_eq!(app.quota(&employee).yearly_count, 12);
}

#[tokio::test]
async fn test_hr_cannot_decide_before_manager() {
    let app = TestApp::new();
    let manager = app.manager();
    let hr = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let result = app
        .state
        .leave_approval
        .decide_as_hr(hr.id, reject(group.id))
        .await;

    assert!(result.unwrap_err().to_string().contains("not been approved"));
}

#[tokio::test]
async fn test_only_assigned_manager_can_decide() {
    let app = TestApp::new();
    let manager = app.manager();
    let other = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let result = app
        .state
        .leave_approval
        .decide_as_manager(other.id, reject(group.id))
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_second_manager_decision_is_refused() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    app.state
        .leave_approval
        .decide_as_manager(manager.id, reject(group.id))
        .await
        .unwrap();
    let again = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, reject(group.id))
        .await;

    assert!(again.unwrap_err().to_string().contains("already processed"));
    // Quota was released once, not twice.
    assert_eq!(app.quota(&employee).marriage_count, 3);
}

#[tokio::test]
async fn test_overflow_cannot_be_decided_directly() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;

    let result = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, reject(group.children[0].id))
        .await;

    assert!(result.unwrap_err().is_domain());
}

#[tokio::test]
async fn test_failed_write_keeps_group_unchanged() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let group = marriage_with_two_overflows(&app, &employee).await;
    app.store.fail_writes_for(group.id);

    let result = app
        .state
        .leave_approval
        .decide_as_manager(manager.id, reject(group.id))
        .await;

    assert!(result.is_err());
    assert!(app.store.leave(group.id).unwrap().manager_decision.is_undecided());
    assert_eq!(app.quota(&employee).marriage_count, 0);
}
