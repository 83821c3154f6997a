use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{
        ConfigurationChangeLog, ConfigurationPolicy, ConfigurationRow, FieldChange,
        StagedChanges, StagedSlot,
    },
    stores::{ConfigStore, StoreResult},
    utils::sql,
};
use crate::error::StoreError;

const POLICY_COLUMNS: &str = r#"
    office_start,
    office_end,
    acceptance_attendance_interval,
    acceptance_leave_interval,
    default_yearly_quota,
    default_marriage_quota,
    max_overtime_daily_hours,
    max_overtime_weekly_hours
"#;

#[derive(Debug, sqlx::FromRow)]
struct ChangeLogRow {
    id: Uuid,
    changed_by: Uuid,
    slot: StagedSlot,
    changes: String,
    effective_from: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChangeLogRow> for ConfigurationChangeLog {
    type Error = StoreError;

    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        let changes: Vec<FieldChange> = serde_json::from_str(&row.changes)
            .map_err(|e| StoreError::Backend(format!("corrupt change log {}: {}", row.id, e)))?;

        Ok(ConfigurationChangeLog {
            id: row.id,
            changed_by: row.changed_by,
            slot: row.slot,
            changes,
            effective_from: row.effective_from,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct ConfigurationRepository {
    pool: PgPool,
}

impl ConfigurationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_staged(payload: &str) -> StoreResult<StagedChanges> {
    serde_json::from_str(payload)
        .map_err(|e| StoreError::Backend(format!("corrupt staged configuration: {}", e)))
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

async fn staged_for_update(
    tx: &mut Transaction<'_, Postgres>,
    slot: StagedSlot,
) -> StoreResult<Option<StagedChanges>> {
    let payload = sqlx::query_scalar::<_, String>(&sql(r#"
        SELECT
            payload
        FROM
            configuration_staged_changes
        WHERE
            slot = ?
        FOR UPDATE
    "#))
    .bind(slot)
    .fetch_optional(&mut **tx)
    .await?;

    payload.as_deref().map(decode_staged).transpose()
}

async fn write_policy(
    tx: &mut Transaction<'_, Postgres>,
    policy: &ConfigurationPolicy,
) -> StoreResult<()> {
    sqlx::query(&sql(&format!(
        r#"
        INSERT INTO
            configurations (id, {POLICY_COLUMNS})
        VALUES
            (1, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            office_start = EXCLUDED.office_start,
            office_end = EXCLUDED.office_end,
            acceptance_attendance_interval = EXCLUDED.acceptance_attendance_interval,
            acceptance_leave_interval = EXCLUDED.acceptance_leave_interval,
            default_yearly_quota = EXCLUDED.default_yearly_quota,
            default_marriage_quota = EXCLUDED.default_marriage_quota,
            max_overtime_daily_hours = EXCLUDED.max_overtime_daily_hours,
            max_overtime_weekly_hours = EXCLUDED.max_overtime_weekly_hours
        "#
    )))
    .bind(policy.office_start)
    .bind(policy.office_end)
    .bind(policy.acceptance_attendance_interval)
    .bind(policy.acceptance_leave_interval)
    .bind(policy.default_yearly_quota)
    .bind(policy.default_marriage_quota)
    .bind(policy.max_overtime_daily_hours)
    .bind(policy.max_overtime_weekly_hours)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl ConfigStore for ConfigurationRepository {
    async fn get(&self) -> StoreResult<Option<ConfigurationPolicy>> {
        let row = sqlx::query_as::<_, ConfigurationRow>(&sql(&format!(
            r#"
            SELECT
                {POLICY_COLUMNS}
            FROM
                configurations
            WHERE
                id = 1
            "#
        )))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ConfigurationPolicy::from))
    }

    async fn save(&self, policy: &ConfigurationPolicy) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        write_policy(&mut tx, policy).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_staged(&self, slot: StagedSlot) -> StoreResult<Option<StagedChanges>> {
        let payload = sqlx::query_scalar::<_, String>(&sql(r#"
            SELECT
                payload
            FROM
                configuration_staged_changes
            WHERE
                slot = ?
        "#))
        .bind(slot)
        .fetch_optional(&self.pool)
        .await?;

        payload.as_deref().map(decode_staged).transpose()
    }

    async fn stage(
        &self,
        slot: StagedSlot,
        changes: &StagedChanges,
        log: &ConfigurationChangeLog,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let mut merged = staged_for_update(&mut tx, slot).await?.unwrap_or_default();
        merged.merge(changes);

        sqlx::query(&sql(r#"
            INSERT INTO
                configuration_staged_changes (slot, payload, updated_at)
            VALUES
                (?, ?, ?)
            ON CONFLICT (slot) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
        "#))
        .bind(slot)
        .bind(encode(&merged)?)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&sql(r#"
            INSERT INTO
                configuration_change_logs (
                    id,
                    changed_by,
                    slot,
                    changes,
                    effective_from,
                    created_at
                )
            VALUES
                (?, ?, ?, ?, ?, ?)
        "#))
        .bind(log.id)
        .bind(log.changed_by)
        .bind(log.slot)
        .bind(encode(&log.changes)?)
        .bind(log.effective_from)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_staged(&self, slot: StagedSlot) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let Some(staged) = staged_for_update(&mut tx, slot).await? else {
            return Ok(false);
        };

        let row = sqlx::query_as::<_, ConfigurationRow>(&sql(&format!(
            r#"
            SELECT
                {POLICY_COLUMNS}
            FROM
                configurations
            WHERE
                id = 1
            FOR UPDATE
            "#
        )))
        .fetch_optional(&mut *tx)
        .await?;

        let mut policy = row.map(ConfigurationPolicy::from).unwrap_or_default();
        staged.apply_to(&mut policy);
        write_policy(&mut tx, &policy).await?;

        sqlx::query(&sql(r#"
            DELETE FROM
                configuration_staged_changes
            WHERE
                slot = ?
        "#))
        .bind(slot)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(!staged.is_empty())
    }

    async fn clear_staged(&self, slot: StagedSlot) -> StoreResult<()> {
        sqlx::query(&sql(r#"
            DELETE FROM
                configuration_staged_changes
            WHERE
                slot = ?
        "#))
        .bind(slot)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn change_logs(&self) -> StoreResult<Vec<ConfigurationChangeLog>> {
        let rows = sqlx::query_as::<_, ChangeLogRow>(&sql(r#"
            SELECT
                id,
                changed_by,
                slot,
                changes,
                effective_from,
                created_at
            FROM
                configuration_change_logs
            ORDER BY
                created_at DESC
        "#))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConfigurationChangeLog::try_from).collect()
    }
}
