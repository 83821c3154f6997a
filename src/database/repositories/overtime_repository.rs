use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::{
    models::{
        AutoClosure, Decision, HistoryScope, Overtime, OvertimeFilter, OvertimeRow,
        OvertimeStatus, Page, PageRequest,
    },
    stores::{OvertimeStore, StoreResult},
    utils::{Conditions, page_bounds, sql},
};

pub(crate) const OVERTIME_COLUMNS: &str = r#"
    id,
    attendance_id,
    employee_id,
    manager_id,
    duration_seconds,
    reason,
    approved_by_manager,
    action_by_manager_at,
    manager_rejection_reason,
    closed_automatically_at,
    closed_reason,
    created_at
"#;

#[derive(Clone)]
pub struct OvertimeRepository {
    pool: PgPool,
}

impl OvertimeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_open(&self, manager_id: Option<Uuid>) -> StoreResult<Vec<Overtime>> {
        let rows = sqlx::query_as::<_, OvertimeRow>(&sql(&format!(
            r#"
            SELECT
                {OVERTIME_COLUMNS}
            FROM
                overtimes
            WHERE
                approved_by_manager IS NULL
                AND closed_automatically_at IS NULL
                AND (?::UUID IS NULL OR manager_id = ?)
            ORDER BY
                created_at
            "#
        )))
        .bind(manager_id)
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Overtime::from).collect())
    }
}

pub(crate) async fn insert_overtime(
    tx: &mut Transaction<'_, Postgres>,
    overtime: &Overtime,
) -> StoreResult<()> {
    let (approved, acted_at, rejection_reason) = overtime.manager_decision.to_columns();

    sqlx::query(&sql(r#"
        INSERT INTO
            overtimes (
                id,
                attendance_id,
                employee_id,
                manager_id,
                duration_seconds,
                reason,
                approved_by_manager,
                action_by_manager_at,
                manager_rejection_reason,
                created_at
            )
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#))
    .bind(overtime.id)
    .bind(overtime.attendance_id)
    .bind(overtime.employee_id)
    .bind(overtime.manager_id)
    .bind(overtime.duration.num_seconds())
    .bind(&overtime.reason)
    .bind(approved)
    .bind(acted_at)
    .bind(rejection_reason)
    .bind(overtime.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub(crate) async fn find_by_attendance(
    pool: &PgPool,
    attendance_id: Uuid,
) -> StoreResult<Option<Overtime>> {
    let row = sqlx::query_as::<_, OvertimeRow>(&sql(&format!(
        r#"
        SELECT
            {OVERTIME_COLUMNS}
        FROM
            overtimes
        WHERE
            attendance_id = ?
        "#
    )))
    .bind(attendance_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Overtime::from))
}

#[async_trait]
impl OvertimeStore for OvertimeRepository {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Overtime>> {
        let row = sqlx::query_as::<_, OvertimeRow>(&sql(&format!(
            r#"
            SELECT
                {OVERTIME_COLUMNS}
            FROM
                overtimes
            WHERE
                id = ?
            "#
        )))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Overtime::from))
    }

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<Overtime>> {
        self.fetch_open(Some(manager_id)).await
    }

    async fn save_manager_decision(&self, id: Uuid, decision: &Decision) -> StoreResult<bool> {
        let (approved, acted_at, rejection_reason) = decision.to_columns();

        let result = sqlx::query(&sql(r#"
            UPDATE
                overtimes
            SET
                approved_by_manager = ?,
                action_by_manager_at = ?,
                manager_rejection_reason = ?
            WHERE
                id = ?
                AND approved_by_manager IS NULL
                AND closed_automatically_at IS NULL
        "#))
        .bind(approved)
        .bind(acted_at)
        .bind(rejection_reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_undecided(&self) -> StoreResult<Vec<Overtime>> {
        self.fetch_open(None).await
    }

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        let result = sqlx::query(&sql(r#"
            UPDATE
                overtimes
            SET
                closed_automatically_at = ?,
                closed_reason = ?
            WHERE
                id = ?
                AND approved_by_manager IS NULL
                AND closed_automatically_at IS NULL
        "#))
        .bind(closure.at)
        .bind(&closure.reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn history(
        &self,
        filter: &OvertimeFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Overtime>> {
        let mut conditions = Conditions::default();
        match filter.scope {
            HistoryScope::Employee(id) => conditions.push_id("employee_id = ?", id),
            HistoryScope::StaffOf(manager_id) => conditions.push_id("manager_id = ?", manager_id),
            HistoryScope::All => {}
        }
        conditions.push_window("created_at", filter.window.as_ref());
        if let Some(status) = filter.status {
            conditions.push(match status {
                OvertimeStatus::Pending => {
                    "approved_by_manager IS NULL AND closed_automatically_at IS NULL"
                }
                OvertimeStatus::Approved => {
                    "approved_by_manager = TRUE AND closed_automatically_at IS NULL"
                }
                OvertimeStatus::Rejected => {
                    "approved_by_manager = FALSE AND closed_automatically_at IS NULL"
                }
                OvertimeStatus::Closed => "closed_automatically_at IS NOT NULL",
            });
        }
        if filter.settled_only {
            conditions.push("(approved_by_manager IS NOT NULL OR closed_automatically_at IS NOT NULL)");
        }

        let (total,) = conditions
            .bind(sqlx::query_as::<_, (i64,)>(&sql(&format!(
                "SELECT COUNT(*) FROM overtimes{}",
                conditions.where_clause()
            ))))
            .fetch_one(&self.pool)
            .await?;

        let (limit, offset) = page_bounds(page);
        let rows = conditions
            .bind(sqlx::query_as::<_, OvertimeRow>(&sql(&format!(
                r#"
                SELECT
                    {OVERTIME_COLUMNS}
                FROM
                    overtimes
                {}
                ORDER BY
                    created_at DESC
                LIMIT ? OFFSET ?
                "#,
                conditions.where_clause()
            ))))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(Overtime::from).collect(),
            page,
            total.max(0) as u64,
        ))
    }
}
