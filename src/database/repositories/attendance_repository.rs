use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::overtime_repository::{find_by_attendance, insert_overtime};
use crate::database::{
    models::{
        Attendance, AttendanceFilter, AttendanceRow, AutoClosure, HistoryScope, Overtime, Page,
        PageRequest,
    },
    stores::{AttendanceStore, StoreResult},
    utils::{Conditions, page_bounds, sql},
};

const ATTENDANCE_COLUMNS: &str = r#"
    id,
    employee_id,
    clock_in_at,
    clock_out_at,
    clock_in_lat,
    clock_in_lng,
    clock_out_lat,
    clock_out_lng,
    done_for_the_day,
    late_clock_in,
    early_clock_out,
    closed_automatically_at,
    closed_reason
"#;

#[derive(Clone)]
pub struct AttendanceRepository {
    pool: PgPool,
}

impl AttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_overtime(&self, row: Option<AttendanceRow>) -> StoreResult<Option<Attendance>> {
        let Some(row) = row else {
            return Ok(None);
        };

        let mut attendance = Attendance::from(row);
        attendance.overtime = find_by_attendance(&self.pool, attendance.id).await?;
        Ok(Some(attendance))
    }
}

#[async_trait]
impl AttendanceStore for AttendanceRepository {
    async fn find_in_range(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Option<Attendance>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&sql(&format!(
            r#"
            SELECT
                {ATTENDANCE_COLUMNS}
            FROM
                attendances
            WHERE
                employee_id = ?
                AND clock_in_at BETWEEN ? AND ?
            ORDER BY
                clock_in_at DESC
            LIMIT 1
            "#
        )))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        self.with_overtime(row).await
    }

    async fn find_active(&self, employee_id: Uuid) -> StoreResult<Option<Attendance>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&sql(&format!(
            r#"
            SELECT
                {ATTENDANCE_COLUMNS}
            FROM
                attendances
            WHERE
                employee_id = ?
                AND done_for_the_day = FALSE
            ORDER BY
                clock_in_at DESC
            LIMIT 1
            "#
        )))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        self.with_overtime(row).await
    }

    async fn create(&self, attendance: &Attendance) -> StoreResult<()> {
        sqlx::query(&sql(r#"
            INSERT INTO
                attendances (
                    id,
                    employee_id,
                    clock_in_at,
                    clock_in_lat,
                    clock_in_lng,
                    done_for_the_day,
                    late_clock_in,
                    early_clock_out
                )
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?)
        "#))
        .bind(attendance.id)
        .bind(attendance.employee_id)
        .bind(attendance.clock_in_at)
        .bind(attendance.clock_in_loc.lat)
        .bind(attendance.clock_in_loc.lng)
        .bind(attendance.done_for_the_day)
        .bind(attendance.late_clock_in)
        .bind(attendance.early_clock_out)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close(
        &self,
        attendance: &Attendance,
        overtime: Option<&Overtime>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&sql(r#"
            UPDATE
                attendances
            SET
                clock_out_at = ?,
                clock_out_lat = ?,
                clock_out_lng = ?,
                done_for_the_day = TRUE,
                early_clock_out = ?
            WHERE
                id = ?
                AND done_for_the_day = FALSE
        "#))
        .bind(attendance.clock_out_at)
        .bind(attendance.clock_out_loc.map(|p| p.lat))
        .bind(attendance.clock_out_loc.map(|p| p.lng))
        .bind(attendance.early_clock_out)
        .bind(attendance.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(overtime) = overtime {
            insert_overtime(&mut tx, overtime).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find_open(&self) -> StoreResult<Vec<Attendance>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql(&format!(
            r#"
            SELECT
                {ATTENDANCE_COLUMNS}
            FROM
                attendances
            WHERE
                done_for_the_day = FALSE
            ORDER BY
                clock_in_at
            "#
        )))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attendance::from).collect())
    }

    async fn close_automatically(&self, id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        let result = sqlx::query(&sql(r#"
            UPDATE
                attendances
            SET
                clock_out_at = ?,
                done_for_the_day = TRUE,
                closed_automatically_at = ?,
                closed_reason = ?
            WHERE
                id = ?
                AND done_for_the_day = FALSE
        "#))
        .bind(closure.at)
        .bind(closure.at)
        .bind(&closure.reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn history(
        &self,
        filter: &AttendanceFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Attendance>> {
        let mut conditions = Conditions::default();
        conditions.push("done_for_the_day = TRUE");
        match filter.scope {
            HistoryScope::Employee(id) => conditions.push_id("employee_id = ?", id),
            HistoryScope::StaffOf(manager_id) => conditions.push_id(
                "employee_id IN (SELECT id FROM employees WHERE manager_id = ?)",
                manager_id,
            ),
            HistoryScope::All => {}
        }
        conditions.push_window("clock_in_at", filter.window.as_ref());
        if filter.late_only {
            conditions.push("late_clock_in = TRUE");
        }
        if filter.early_only {
            conditions.push("early_clock_out = TRUE");
        }
        if filter.closed_only {
            conditions.push("closed_automatically_at IS NOT NULL");
        }

        let (total,) = conditions
            .bind(sqlx::query_as::<_, (i64,)>(&sql(&format!(
                "SELECT COUNT(*) FROM attendances{}",
                conditions.where_clause()
            ))))
            .fetch_one(&self.pool)
            .await?;

        let (limit, offset) = page_bounds(page);
        let rows = conditions
            .bind(sqlx::query_as::<_, AttendanceRow>(&sql(&format!(
                r#"
                SELECT
                    {ATTENDANCE_COLUMNS}
                FROM
                    attendances
                {}
                ORDER BY
                    clock_in_at DESC
                LIMIT ? OFFSET ?
                "#,
                conditions.where_clause()
            ))))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(attendance) = self.with_overtime(Some(row)).await? {
                items.push(attendance);
            }
        }
        Ok(Page::new(items, page, total.max(0) as u64))
    }

    async fn weekly_overtime_sum(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Duration> {
        let seconds = sqlx::query_scalar::<_, i64>(&sql(r#"
            SELECT
                COALESCE(SUM(duration_seconds), 0)::BIGINT
            FROM
                overtimes
            WHERE
                employee_id = ?
                AND created_at BETWEEN ? AND ?
                AND closed_automatically_at IS NULL
                AND (approved_by_manager IS NULL OR approved_by_manager = TRUE)
        "#))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(Duration::seconds(seconds))
    }
}
