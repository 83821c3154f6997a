use std::sync::Arc;

use uuid::Uuid;

use crate::database::{
    models::{LeaveQuota, LeaveRequest, LeaveType, QuotaAdjustment},
    stores::QuotaStore,
};
use crate::error::{AppError, AppResult};

/// Balance arithmetic for leave quotas.
///
/// Reservations and releases are produced as `QuotaAdjustment`s so that the
/// caller can apply them in the same transaction as the write they belong to.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn QuotaStore>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Takes `days` from the balance; sick leave has none.
    pub fn reserve(employee_id: Uuid, leave_type: LeaveType, days: i64) -> Option<QuotaAdjustment> {
        QuotaAdjustment::reservation(employee_id, leave_type, days)
    }

    /// Gives back exactly what `reserve` took for the same amount.
    pub fn release(employee_id: Uuid, leave_type: LeaveType, days: i64) -> Option<QuotaAdjustment> {
        Self::reserve(employee_id, leave_type, days).map(|reservation| reservation.inverse())
    }

    /// Release for one stored block, recovered from its own date range.
    pub fn release_for(request: &LeaveRequest) -> Option<QuotaAdjustment> {
        QuotaAdjustment::release_of(request)
    }

    pub fn reserve_for(request: &LeaveRequest) -> Option<QuotaAdjustment> {
        Self::reserve(request.employee_id, request.leave_type, request.duration())
    }

    /// Applies a single adjustment immediately.
    pub async fn adjust(&self, employee_id: Uuid, leave_type: LeaveType, delta: i64) -> AppResult<()> {
        if !leave_type.consumes_quota() || delta == 0 {
            return Ok(());
        }

        let adjustment = QuotaAdjustment {
            employee_id,
            leave_type,
            delta,
            guarded: delta < 0 && leave_type != LeaveType::Unpaid,
        };
        self.store.adjust(&adjustment).await?;

        log::info!(
            "Adjusted {} quota of employee {} by {}",
            leave_type,
            employee_id,
            delta
        );
        Ok(())
    }

    pub async fn quota_of(&self, employee_id: Uuid) -> AppResult<LeaveQuota> {
        self.store
            .get(employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("leave quota for employee {}", employee_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reserve_and_release_are_inverses() {
        let employee = Uuid::new_v4();
        let reserved = QuotaLedger::reserve(employee, LeaveType::Annual, 4).unwrap();
        let released = QuotaLedger::release(employee, LeaveType::Annual, 4).unwrap();

        assert_eq!(reserved.delta, -4);
        assert!(reserved.guarded);
        assert_eq!(released.delta, 4);
        assert!(!released.guarded);
        assert_eq!(reserved.delta + released.delta, 0);
    }

    #[test]
    fn test_sick_leave_has_no_adjustment() {
        assert_eq!(QuotaLedger::reserve(Uuid::new_v4(), LeaveType::Sick, 3), None);
        assert_eq!(QuotaLedger::release(Uuid::new_v4(), LeaveType::Sick, 3), None);
    }

    #[test]
    fn test_unpaid_reservation_is_unguarded() {
        let reserved = QuotaLedger::reserve(Uuid::new_v4(), LeaveType::Unpaid, 30).unwrap();
        assert!(!reserved.guarded);
    }
}
