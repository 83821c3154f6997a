use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LeaveRequest, LeaveType};

/// Ceiling for unpaid leave; never actually exhausted.
pub const UNPAID_QUOTA_CEILING: i64 = 365;

/// Remaining days per balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaveQuota {
    pub employee_id: Uuid,
    pub yearly_count: i64,
    pub marriage_count: i64,
    pub unpaid_count: i64,
}

impl LeaveQuota {
    pub fn new(employee_id: Uuid, yearly: i64, marriage: i64) -> Self {
        Self {
            employee_id,
            yearly_count: yearly,
            marriage_count: marriage,
            unpaid_count: UNPAID_QUOTA_CEILING,
        }
    }

    /// Remaining balance for `leave_type`; `None` for types without one.
    pub fn remaining(&self, leave_type: LeaveType) -> Option<i64> {
        match leave_type {
            LeaveType::Annual => Some(self.yearly_count),
            LeaveType::Marriage => Some(self.marriage_count),
            LeaveType::Unpaid => Some(self.unpaid_count),
            LeaveType::Sick => None,
        }
    }
}

/// A single signed change to one balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAdjustment {
    pub employee_id: Uuid,
    pub leave_type: LeaveType,
    pub delta: i64,
    /// Refuse the change if it would leave the balance below zero.
    pub guarded: bool,
}

impl QuotaAdjustment {
    /// Takes `days` from the balance; sick leave has none.
    pub fn reservation(employee_id: Uuid, leave_type: LeaveType, days: i64) -> Option<Self> {
        if !leave_type.consumes_quota() || days <= 0 {
            return None;
        }

        Some(Self {
            employee_id,
            leave_type,
            delta: -days,
            // The unpaid counter is a ceiling, never exhausted.
            guarded: leave_type != LeaveType::Unpaid,
        })
    }

    /// Gives back what one stored block reserved, recovered from its dates.
    pub fn release_of(block: &LeaveRequest) -> Option<Self> {
        Self::reservation(block.employee_id, block.leave_type, block.duration())
            .map(|reservation| reservation.inverse())
    }

    pub fn inverse(&self) -> Self {
        Self {
            employee_id: self.employee_id,
            leave_type: self.leave_type,
            delta: -self.delta,
            guarded: false,
        }
    }

    /// Column holding the balance this adjustment touches.
    pub fn column(&self) -> Option<&'static str> {
        quota_column(self.leave_type)
    }
}

pub fn quota_column(leave_type: LeaveType) -> Option<&'static str> {
    match leave_type {
        LeaveType::Annual => Some("yearly_count"),
        LeaveType::Marriage => Some("marriage_count"),
        LeaveType::Unpaid => Some("unpaid_count"),
        LeaveType::Sick => None,
    }
}
