use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::{
    models::{BlockVerdict, Decision, LeaveAction, LeaveRequest, LeaveStatus, QuotaAdjustment},
    stores::{EmployeeStore, GroupDecision, LeaveStore},
};
use crate::error::{AppError, AppResult};
use crate::services::leave_request::{LEAVE_REASON_MAX, LEAVE_REASON_MIN};
use crate::services::notification::{NotificationKind, NotificationService};
use crate::services::validation::validate_reason;
use crate::services::quota_ledger::QuotaLedger;

pub const CASCADE_REJECTION_REASON: &str = "This leave is rejected because the associated leave was rejected. All overflows will be automatically rejected if the main leave is rejected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Manager,
    Hr,
}

fn approval_error(message: impl Into<String>) -> AppError {
    AppError::domain("Leave", message)
}

fn rejection(reason: Option<&str>, at: DateTime<Utc>) -> AppResult<Decision> {
    let reason = reason.unwrap_or_default();
    validate_reason(reason, LEAVE_REASON_MIN, LEAVE_REASON_MAX)?;
    Ok(Decision::rejected(at, reason.trim()))
}

/// Turns a reviewer action into per-block decisions for `pending` children.
///
/// Rejecting the root cascades to every pending child. Approving it needs an
/// explicit verdict for each pending child and nothing else.
fn resolve_group(
    root: &LeaveRequest,
    pending: &[&LeaveRequest],
    action: &LeaveAction,
    at: DateTime<Utc>,
) -> AppResult<Vec<(Uuid, Decision)>> {
    let mut decisions = Vec::with_capacity(pending.len() + 1);

    if !action.approve {
        decisions.push((root.id, rejection(action.rejection_reason.as_deref(), at)?));
        for child in pending {
            decisions.push((child.id, Decision::rejected(at, CASCADE_REJECTION_REASON)));
        }
        return Ok(decisions);
    }

    decisions.push((root.id, Decision::approved(at)));

    if let Some(stray) = action
        .children
        .iter()
        .find(|v| !pending.iter().any(|c| c.id == v.leave_id))
    {
        return Err(approval_error(format!(
            "leave {} is not an overflow awaiting this decision",
            stray.leave_id
        )));
    }

    for child in pending {
        let verdicts: Vec<&BlockVerdict> = action
            .children
            .iter()
            .filter(|v| v.leave_id == child.id)
            .collect();
        let [verdict] = verdicts.as_slice() else {
            return Err(approval_error(format!(
                "exactly one decision is required for overflow leave {}",
                child.id
            )));
        };

        let decision = if verdict.approve {
            Decision::approved(at)
        } else {
            rejection(verdict.rejection_reason.as_deref(), at)?
        };
        decisions.push((child.id, decision));
    }

    Ok(decisions)
}

/// Quota to give back for every block being rejected.
fn releases_for(root: &LeaveRequest, decisions: &[(Uuid, Decision)]) -> Vec<QuotaAdjustment> {
    decisions
        .iter()
        .filter(|(_, d)| d.is_rejected())
        .filter_map(|(id, _)| {
            if *id == root.id {
                Some(root)
            } else {
                root.child(*id)
            }
        })
        .filter_map(QuotaLedger::release_for)
        .collect()
}

fn apply_in_memory(root: &mut LeaveRequest, decisions: &[(Uuid, Decision)], stage: Stage, actor: Uuid) {
    for (id, decision) in decisions {
        let block = if *id == root.id {
            Some(&mut *root)
        } else {
            root.children.iter_mut().find(|c| c.id == *id)
        };
        if let Some(block) = block {
            match stage {
                Stage::Manager => block.manager_decision = decision.clone(),
                Stage::Hr => {
                    block.hr_decision = decision.clone();
                    block.hr_id = Some(actor);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct LeaveApprovalService {
    leaves: Arc<dyn LeaveStore>,
    employees: Arc<dyn EmployeeStore>,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
}

impl LeaveApprovalService {
    pub fn new(
        leaves: Arc<dyn LeaveStore>,
        employees: Arc<dyn EmployeeStore>,
        notifications: NotificationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leaves,
            employees,
            notifications,
            clock,
        }
    }

    async fn open_root(&self, leave_id: Uuid) -> AppResult<LeaveRequest> {
        let root = self
            .leaves
            .find_by_id(leave_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("leave {}", leave_id)))?;

        if !root.is_root() {
            return Err(approval_error(
                "overflow leaves are decided together with their main leave",
            ));
        }
        if root.closed_automatically.is_some() {
            return Err(approval_error("leave was closed automatically"));
        }

        Ok(root)
    }

    pub async fn decide_as_manager(&self, manager_id: Uuid, action: LeaveAction) -> AppResult<LeaveRequest> {
        let mut root = self.open_root(action.leave_id).await?;

        if root.manager_id != Some(manager_id) {
            return Err(AppError::Forbidden(
                "only the assigned manager can process this leave".to_string(),
            ));
        }
        if !root.manager_decision.is_undecided() {
            return Err(approval_error("leave was already processed by the manager"));
        }

        let pending: Vec<&LeaveRequest> = root
            .children
            .iter()
            .filter(|c| c.manager_decision.is_undecided() && c.closed_automatically.is_none())
            .collect();
        let decisions = resolve_group(&root, &pending, &action, self.clock.now())?;
        let releases = releases_for(&root, &decisions);

        let write = GroupDecision {
            root_id: root.id,
            actor_id: manager_id,
            decisions,
            releases,
        };
        if !self.leaves.save_manager_decision(&write).await? {
            return Err(approval_error("leave was already processed or closed"));
        }

        apply_in_memory(&mut root, &write.decisions, Stage::Manager, manager_id);
        log::info!(
            "Manager {} {} leave {}",
            manager_id,
            if action.approve { "approved" } else { "rejected" },
            root.id
        );

        self.notify_requester(&root).await;
        Ok(root)
    }

    pub async fn decide_as_hr(&self, hr_id: Uuid, action: LeaveAction) -> AppResult<LeaveRequest> {
        let mut root = self.open_root(action.leave_id).await?;

        if !root.manager_decision.is_approved() {
            return Err(approval_error("leave has not been approved by the manager"));
        }
        if !root.hr_decision.is_undecided() {
            return Err(approval_error("leave was already processed by HR"));
        }

        let pending: Vec<&LeaveRequest> = root
            .children
            .iter()
            .filter(|c| {
                c.manager_decision.is_approved()
                    && c.hr_decision.is_undecided()
                    && c.closed_automatically.is_none()
            })
            .collect();
        let decisions = resolve_group(&root, &pending, &action, self.clock.now())?;
        let releases = releases_for(&root, &decisions);

        let write = GroupDecision {
            root_id: root.id,
            actor_id: hr_id,
            decisions,
            releases,
        };
        if !self.leaves.save_hr_decision(&write).await? {
            return Err(approval_error("leave was already processed or closed"));
        }

        apply_in_memory(&mut root, &write.decisions, Stage::Hr, hr_id);
        log::info!(
            "HR {} {} leave {}",
            hr_id,
            if action.approve { "approved" } else { "rejected" },
            root.id
        );

        self.notify_requester(&root).await;
        Ok(root)
    }

    async fn notify_requester(&self, root: &LeaveRequest) {
        let requester = match self.employees.get_by_id(root.employee_id).await {
            Ok(Some(requester)) => requester,
            Ok(None) => {
                log::warn!("Requester {} of leave {} not found", root.employee_id, root.id);
                return;
            }
            Err(e) => {
                log::error!("Failed to load requester {}: {}", root.employee_id, e);
                return;
            }
        };

        let status: LeaveStatus = root.status();
        self.notifications
            .notify(
                NotificationKind::LeaveDecided,
                &requester,
                serde_json::json!({
                    "leaveId": root.id,
                    "status": status,
                    "children": root
                        .children
                        .iter()
                        .map(|c| serde_json::json!({ "leaveId": c.id, "status": c.status() }))
                        .collect::<Vec<_>>(),
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::LeaveType;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn block(parent_id: Option<Uuid>, from: u32, to: u32, leave_type: LeaveType) -> LeaveRequest {
        LeaveRequest {
            id: Uuid::new_v4(),
            employee_id: Uuid::nil(),
            from: NaiveDate::from_ymd_opt(2024, 1, from).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 1, to).unwrap(),
            leave_type,
            reason: "Visiting family back home for a while".to_string(),
            parent_id,
            children: Vec::new(),
            manager_id: Some(Uuid::new_v4()),
            hr_id: None,
            manager_decision: Decision::Undecided,
            hr_decision: Decision::Undecided,
            closed_automatically: None,
            created_at: Utc::now(),
        }
    }

    fn group() -> LeaveRequest {
        let mut root = block(None, 8, 12, LeaveType::Annual);
        let a = block(Some(root.id), 15, 16, LeaveType::Unpaid);
        let b = block(Some(root.id), 17, 17, LeaveType::Unpaid);
        root.children = vec![a, b];
        root
    }

    #[test]
    fn test_rejection_cascades_to_children() {
        let root = group();
        let pending: Vec<&LeaveRequest> = root.children.iter().collect();
        let action = LeaveAction {
            leave_id: root.id,
            approve: false,
            rejection_reason: Some("The team is short-staffed that week".to_string()),
            children: Vec::new(),
        };

        let decisions = resolve_group(&root, &pending, &action, Utc::now()).unwrap();
        assert_eq!(decisions.len(), 3);
        assert!(decisions.iter().all(|(_, d)| d.is_rejected()));
        assert_eq!(decisions[1].1.rejection_reason(), Some(CASCADE_REJECTION_REASON));

        let releases = releases_for(&root, &decisions);
        let released: i64 = releases.iter().map(|r| r.delta).sum();
        assert_eq!(released, 5 + 2 + 1);
    }

    #[test]
    fn test_rejection_requires_long_reason() {
        let root = group();
        let action = LeaveAction {
            leave_id: root.id,
            approve: false,
            rejection_reason: Some("no".to_string()),
            children: Vec::new(),
        };
        assert!(resolve_group(&root, &[], &action, Utc::now()).is_err());
    }

    #[test]
    fn test_approval_needs_a_verdict_per_child() {
        let root = group();
        let pending: Vec<&LeaveRequest> = root.children.iter().collect();
        let mut action = LeaveAction {
            leave_id: root.id,
            approve: true,
            rejection_reason: None,
            children: vec![BlockVerdict {
                leave_id: root.children[0].id,
                approve: true,
                rejection_reason: None,
            }],
        };
        assert!(resolve_group(&root, &pending, &action, Utc::now()).is_err());

        action.children.push(BlockVerdict {
            leave_id: root.children[1].id,
            approve: false,
            rejection_reason: Some("Unpaid extension is not possible now".to_string()),
        });
        let decisions = resolve_group(&root, &pending, &action, Utc::now()).unwrap();
        assert!(decisions[0].1.is_approved());
        assert!(decisions[1].1.is_approved());
        assert!(decisions[2].1.is_rejected());

        let releases = releases_for(&root, &decisions);
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].delta, 1);
    }

    #[test]
    fn test_verdict_for_unknown_block_is_rejected() {
        let root = group();
        let action = LeaveAction {
            leave_id: root.id,
            approve: true,
            rejection_reason: None,
            children: vec![BlockVerdict {
                leave_id: Uuid::new_v4(),
                approve: true,
                rejection_reason: None,
            }],
        };
        assert!(resolve_group(&root, &[], &action, Utc::now()).is_err());
    }
}
