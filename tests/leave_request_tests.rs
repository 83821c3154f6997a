use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Barrier;
use uuid::Uuid;

use worktime::database::models::{LeaveQuota, LeaveStatus, LeaveType, QuotaAdjustment};
use worktime::database::stores::{QuotaStore, StoreResult};
use worktime::services::{LeaveRequestService, NotificationKind, NotificationService, QuotaLedger};
use worktime::test_utils::MemoryStore;

mod common;
use common::{TestApp, application, date, decision};

#[tokio::test]
async fn test_fourteen_days_against_twelve_reports_leakage() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let report = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
        )
        .await
        .unwrap();

    assert!(report.is_leakage);
    assert_eq!(report.excess, 2);
    assert_eq!(report.remaining_quota, 12);
    assert_eq!(report.available_types, vec![LeaveType::Unpaid]);
    assert_eq!(report.available_quotas, vec![365]);

    // Building a report never touches the balance.
    assert_eq!(app.quota(&employee).yearly_count, 12);
    assert_eq!(app.store.leave_count(), 0);
}

#[tokio::test]
async fn test_confirm_splits_excess_into_contiguous_overflow() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let group = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
                &[(LeaveType::Unpaid, 2)],
            ),
        )
        .await
        .unwrap();

    assert_eq!(group.from, date(2024, 1, 22));
    assert_eq!(group.to, date(2024, 2, 6));
    assert_eq!(group.duration(), 12);
    assert_eq!(group.children.len(), 1);

    let child = &group.children[0];
    assert_eq!(child.leave_type, LeaveType::Unpaid);
    assert_eq!(child.from, date(2024, 2, 7));
    assert_eq!(child.to, date(2024, 2, 8));
    assert_eq!(child.parent_id, Some(group.id));
    assert!(child.reason.contains("This reason is autogenerated."));
    assert!(child.reason.contains(employee.first_name()));

    assert_eq!(group.total_duration(), 14);
    assert_eq!(group.status(), LeaveStatus::Pending);

    let quota = app.quota(&employee);
    assert_eq!(quota.yearly_count, 0);
    assert_eq!(quota.unpaid_count, 363);

    let stored = app.store.leave(group.id).unwrap();
    assert_eq!(stored.children.len(), 1);
}

#[tokio::test]
async fn test_confirm_notifies_manager_by_mail_without_subscribers() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    app.state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 24), LeaveType::Annual),
                &[],
            ),
        )
        .await
        .unwrap();

    assert_eq!(app.notifier.sent_of(NotificationKind::LeaveSubmitted).len(), 1);
    let mails = app.mailer.sent_to(&manager.email);
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].template, "leave_submitted");
}

#[tokio::test]
async fn test_live_subscriber_suppresses_mail() {
    let app = TestApp::with_subscribers(common::local(2024, 1, 8, 7, 30), 1);
    let manager = app.manager();
    let employee = app.staff(&manager);

    app.state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 24), LeaveType::Annual),
                &[],
            ),
        )
        .await
        .unwrap();

    assert_eq!(app.notifier.sent().len(), 1);
    assert!(app.mailer.sent_to(&manager.email).is_empty());
}

#[tokio::test]
async fn test_overflow_must_cover_exact_excess() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let result = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
                &[(LeaveType::Unpaid, 1)],
            ),
        )
        .await;

    let error = result.unwrap_err();
    assert!(error.is_domain());
    assert!(error.to_string().contains("exactly 2"));
    assert_eq!(app.quota(&employee).yearly_count, 12);
    assert_eq!(app.store.leave_count(), 0);
}

#[tokio::test]
async fn test_overflow_type_must_be_offered() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let result = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
                &[(LeaveType::Marriage, 2)],
            ),
        )
        .await;

    assert!(result.unwrap_err().to_string().contains("not available"));
}

#[tokio::test]
async fn test_marriage_offers_annual_then_unpaid() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    // Five working days against a marriage balance of three.
    let report = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 22), date(2024, 1, 26), LeaveType::Marriage),
        )
        .await
        .unwrap();

    assert!(report.is_leakage);
    assert_eq!(report.excess, 2);
    assert_eq!(
        report.available_types,
        vec![LeaveType::Annual, LeaveType::Unpaid]
    );
    assert_eq!(report.available_quotas, vec![12, 365]);
}

#[tokio::test]
async fn test_married_employee_cannot_request_marriage_leave() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.store.set_biodata(employee.id, true);

    let error = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 22), date(2024, 1, 23), LeaveType::Marriage),
        )
        .await
        .unwrap_err();

    assert!(error.to_string().contains("employee is already married"));
}

#[tokio::test]
async fn test_interns_cannot_request_leave() {
    let app = TestApp::new();
    let manager = app.manager();
    let intern = app.intern(&manager);

    let error = app
        .state
        .leave_requests
        .build_report(
            intern.id,
            &application(date(2024, 1, 22), date(2024, 1, 23), LeaveType::Annual),
        )
        .await
        .unwrap_err();

    assert!(error.is_domain());
}

#[tokio::test]
async fn test_annual_leave_needs_lead_time() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    // Six days away; the default minimum is seven.
    let too_soon = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 14), date(2024, 1, 16), LeaveType::Annual),
        )
        .await;
    assert!(too_soon.is_err());

    // Exactly seven days away is enough for annual leave.
    let on_time = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 15), date(2024, 1, 16), LeaveType::Annual),
        )
        .await;
    assert!(on_time.is_ok());
}

#[tokio::test]
async fn test_marriage_leave_needs_strictly_more_lead_time() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let exactly_seven = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 15), date(2024, 1, 16), LeaveType::Marriage),
        )
        .await;
    assert!(exactly_seven.is_err());

    let eight = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 16), date(2024, 1, 17), LeaveType::Marriage),
        )
        .await;
    assert!(eight.is_ok());
}

#[tokio::test]
async fn test_sick_leave_skips_lead_time_and_quota() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let group = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 8), date(2024, 1, 9), LeaveType::Sick),
                &[],
            ),
        )
        .await
        .unwrap();

    assert_eq!(group.leave_type, LeaveType::Sick);
    assert!(group.children.is_empty());
    assert_eq!(app.quota(&employee).yearly_count, 12);

    let report = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 10), date(2024, 1, 10), LeaveType::Sick),
        )
        .await
        .unwrap();
    assert_eq!(report.remaining_quota, -1);
}

#[tokio::test]
async fn test_exhausted_balance_asks_for_other_type() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.set_quota(&employee, 0, 3);

    let error = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 22), date(2024, 1, 23), LeaveType::Annual),
        )
        .await
        .unwrap_err();

    assert!(
        error
            .to_string()
            .contains("there are no more quota for leave type annual")
    );
}

#[tokio::test]
async fn test_overlapping_request_is_rejected() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    app.state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 24), LeaveType::Annual),
                &[],
            ),
        )
        .await
        .unwrap();

    let error = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 24), date(2024, 1, 26), LeaveType::Unpaid),
        )
        .await
        .unwrap_err();

    assert!(error.to_string().contains("already a leave request"));
}

#[tokio::test]
async fn test_weekend_only_and_inverted_ranges_are_rejected() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let weekend = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 27), date(2024, 1, 28), LeaveType::Annual),
        )
        .await;
    assert!(weekend.is_err());

    let inverted = app
        .state
        .leave_requests
        .build_report(
            employee.id,
            &application(date(2024, 1, 26), date(2024, 1, 22), LeaveType::Annual),
        )
        .await;
    assert!(inverted.is_err());
}

#[tokio::test]
async fn test_manager_request_skips_manager_stage() {
    let app = TestApp::new();
    let manager = app.manager();

    let group = app
        .state
        .leave_requests
        .confirm(
            manager.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 23), LeaveType::Annual),
                &[],
            ),
        )
        .await
        .unwrap();

    assert!(group.manager_decision.is_approved());
    let incoming = app.state.leave_requests.incoming_for_hr().await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, group.id);
}

#[tokio::test]
async fn test_listing_returns_roots_with_children() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let group = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
                &[(LeaveType::Unpaid, 2)],
            ),
        )
        .await
        .unwrap();

    let mine = app.state.leave_requests.my_leaves(employee.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, group.id);
    assert_eq!(mine[0].children.len(), 1);

    let incoming = app
        .state
        .leave_requests
        .incoming_for_manager(manager.id)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
}

#[tokio::test]
async fn test_failed_group_write_leaves_nothing_behind() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    app.store.fail_writes_for(employee.id);

    let error = app
        .state
        .leave_requests
        .confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 2, 8), LeaveType::Annual),
                &[(LeaveType::Unpaid, 2)],
            ),
        )
        .await
        .unwrap_err();

    assert!(!error.is_domain());
    assert_eq!(app.store.leave_count(), 0);
    let quota = app.quota(&employee);
    assert_eq!(quota.yearly_count, 12);
    assert_eq!(quota.unpaid_count, 365);
    assert!(app.mailer.sent().is_empty());
}

/// Returns each balance read only once both requests have read theirs.
struct QuotaReadsMeet {
    inner: Arc<MemoryStore>,
    barrier: Barrier,
}

#[async_trait]
impl QuotaStore for QuotaReadsMeet {
    async fn adjust(&self, adjustment: &QuotaAdjustment) -> StoreResult<()> {
        QuotaStore::adjust(self.inner.as_ref(), adjustment).await
    }

    async fn get(&self, employee_id: Uuid) -> StoreResult<Option<LeaveQuota>> {
        let quota = QuotaStore::get(self.inner.as_ref(), employee_id).await?;
        self.barrier.wait().await;
        Ok(quota)
    }
}

#[tokio::test]
async fn test_concurrent_confirms_never_overdraw_annual() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);

    let ledger = QuotaLedger::new(Arc::new(QuotaReadsMeet {
        inner: app.store.clone(),
        barrier: Barrier::new(2),
    }));
    let service = LeaveRequestService::new(
        app.store.clone(),
        app.store.clone(),
        ledger,
        app.state.configuration.clone(),
        NotificationService::new(Arc::new(app.notifier.clone()), Arc::new(app.mailer.clone())),
        app.clock.clone(),
    );

    // Eight working days each; both reports see twelve days left.
    let (first, second) = tokio::join!(
        service.confirm(
            employee.id,
            decision(
                application(date(2024, 1, 22), date(2024, 1, 31), LeaveType::Annual),
                &[],
            ),
        ),
        service.confirm(
            employee.id,
            decision(
                application(date(2024, 2, 5), date(2024, 2, 14), LeaveType::Annual),
                &[],
            ),
        ),
    );

    let (succeeded, failed): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(Result::is_ok);
    assert_eq!(succeeded.len(), 1);
    let error = failed.into_iter().next().unwrap().unwrap_err();
    assert!(error.is_domain());
    assert!(
        error
            .to_string()
            .contains("there are no more quota for leave type annual")
    );

    assert_eq!(app.quota(&employee).yearly_count, 4);
    assert_eq!(app.store.leave_count(), 1);
}

#[tokio::test]
async fn test_manual_quota_adjustment_is_guarded() {
    let app = TestApp::new();
    let manager = app.manager();
    let employee = app.staff(&manager);
    let ledger = &app.state.quota_ledger;

    let error = ledger
        .adjust(employee.id, LeaveType::Annual, -13)
        .await
        .unwrap_err();
    assert!(error.is_domain());
    assert_eq!(app.quota(&employee).yearly_count, 12);

    ledger.adjust(employee.id, LeaveType::Annual, 2).await.unwrap();
    ledger.adjust(employee.id, LeaveType::Marriage, -3).await.unwrap();
    ledger.adjust(employee.id, LeaveType::Sick, 5).await.unwrap();

    let quota = ledger.quota_of(employee.id).await.unwrap();
    assert_eq!(quota.yearly_count, 14);
    assert_eq!(quota.marriage_count, 0);
}
