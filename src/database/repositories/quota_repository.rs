use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{LeaveQuota, QuotaAdjustment},
    stores::{QuotaStore, StoreResult},
    utils::sql,
};
use crate::error::StoreError;

#[derive(Clone)]
pub struct QuotaRepository {
    pool: PgPool,
}

impl QuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Applies one adjustment inside the caller's transaction as a single
/// arithmetic update. A guarded adjustment that would overdraw the balance
/// matches no row and fails the whole transaction.
pub async fn apply_adjustment(
    tx: &mut Transaction<'_, Postgres>,
    adjustment: &QuotaAdjustment,
) -> StoreResult<()> {
    let Some(column) = adjustment.column() else {
        return Ok(());
    };

    let query = if adjustment.guarded {
        format!(
            r#"
            UPDATE
                employee_leave_quotas
            SET
                {column} = {column} + ?
            WHERE
                employee_id = ?
                AND {column} + ? >= 0
            "#
        )
    } else {
        format!(
            r#"
            UPDATE
                employee_leave_quotas
            SET
                {column} = {column} + ?
            WHERE
                employee_id = ?
            "#
        )
    };

    let query = sql(&query);
    let mut statement = sqlx::query(&query)
        .bind(adjustment.delta)
        .bind(adjustment.employee_id);
    if adjustment.guarded {
        statement = statement.bind(adjustment.delta);
    }

    let result = statement.execute(&mut **tx).await?;

    if result.rows_affected() == 0 {
        log::warn!(
            "Quota adjustment of {} {} days for employee {} matched no balance",
            adjustment.delta,
            adjustment.leave_type,
            adjustment.employee_id
        );
        return Err(if adjustment.guarded {
            StoreError::InsufficientQuota(adjustment.leave_type)
        } else {
            StoreError::NotFound
        });
    }

    Ok(())
}

pub async fn apply_adjustments(
    tx: &mut Transaction<'_, Postgres>,
    adjustments: &[QuotaAdjustment],
) -> StoreResult<()> {
    for adjustment in adjustments {
        apply_adjustment(tx, adjustment).await?;
    }
    Ok(())
}

#[async_trait]
impl QuotaStore for QuotaRepository {
    async fn adjust(&self, adjustment: &QuotaAdjustment) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        apply_adjustment(&mut tx, adjustment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, employee_id: Uuid) -> StoreResult<Option<LeaveQuota>> {
        let quota = sqlx::query_as::<_, LeaveQuota>(&sql(r#"
            SELECT
                employee_id,
                yearly_count,
                marriage_count,
                unpaid_count
            FROM
                employee_leave_quotas
            WHERE
                employee_id = ?
        "#))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quota)
    }
}
