use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::quota_repository::apply_adjustments;
use crate::database::{
    models::{
        AutoClosure, HistoryScope, LeaveFilter, LeaveRequest, LeaveRequestRow, LeaveStatus,
        LeaveType, Page, PageRequest, QuotaAdjustment,
    },
    stores::{GroupDecision, LeaveStore, StoreResult},
    utils::{Conditions, page_bounds, sql},
};

const LEAVE_COLUMNS: &str = r#"
    id,
    employee_id,
    start_date,
    end_date,
    leave_type,
    reason,
    parent_id,
    manager_id,
    hr_id,
    approved_by_manager,
    action_by_manager_at,
    manager_rejection_reason,
    approved_by_hr,
    action_by_hr_at,
    hr_rejection_reason,
    closed_automatically_at,
    closed_reason,
    created_at
"#;

/// Root still waiting on a decision: open, HR undecided, manager not rejecting.
const AWAITING_DECISION: &str = r#"
    closed_automatically_at IS NULL
    AND approved_by_hr IS NULL
    AND (approved_by_manager IS NULL OR approved_by_manager = TRUE)
"#;

#[derive(Clone)]
pub struct LeaveRepository {
    pool: PgPool,
}

impl LeaveRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the children of every root and attaches them in date order.
    async fn attach_children(&self, rows: Vec<LeaveRequestRow>) -> StoreResult<Vec<LeaveRequest>> {
        let mut roots: Vec<LeaveRequest> = rows.into_iter().map(LeaveRequest::from).collect();
        if roots.is_empty() {
            return Ok(roots);
        }

        let ids: Vec<Uuid> = roots.iter().map(|r| r.id).collect();
        let children = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                parent_id = ANY(?)
            ORDER BY
                start_date
            "#
        )))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_parent: HashMap<Uuid, Vec<LeaveRequest>> = HashMap::new();
        for child in children {
            if let Some(parent_id) = child.parent_id {
                by_parent
                    .entry(parent_id)
                    .or_default()
                    .push(LeaveRequest::from(child));
            }
        }

        for root in roots.iter_mut() {
            root.children = by_parent.remove(&root.id).unwrap_or_default();
        }

        Ok(roots)
    }
}

async fn insert_request(
    tx: &mut Transaction<'_, Postgres>,
    request: &LeaveRequest,
) -> StoreResult<()> {
    let (approved_by_manager, action_by_manager_at, manager_rejection_reason) =
        request.manager_decision.to_columns();

    sqlx::query(&sql(r#"
        INSERT INTO
            leave_requests (
                id,
                employee_id,
                start_date,
                end_date,
                leave_type,
                reason,
                parent_id,
                manager_id,
                approved_by_manager,
                action_by_manager_at,
                manager_rejection_reason,
                created_at
            )
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#))
    .bind(request.id)
    .bind(request.employee_id)
    .bind(request.from)
    .bind(request.to)
    .bind(request.leave_type)
    .bind(&request.reason)
    .bind(request.parent_id)
    .bind(request.manager_id)
    .bind(approved_by_manager)
    .bind(action_by_manager_at)
    .bind(manager_rejection_reason)
    .bind(request.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl LeaveStore for LeaveRepository {
    async fn create_group(
        &self,
        root: &LeaveRequest,
        reservations: &[QuotaAdjustment],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        insert_request(&mut tx, root).await?;
        for child in &root.children {
            insert_request(&mut tx, child).await?;
        }
        apply_adjustments(&mut tx, reservations).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<LeaveRequest>> {
        let row = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                id = ?
            "#
        )))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(self.attach_children(vec![row]).await?.into_iter().next())
    }

    async fn find_by_employee(&self, employee_id: Uuid) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                employee_id = ?
                AND parent_id IS NULL
            ORDER BY
                created_at DESC
            "#
        )))
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        self.attach_children(rows).await
    }

    async fn find_pending_for_manager(&self, manager_id: Uuid) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                manager_id = ?
                AND parent_id IS NULL
                AND approved_by_manager IS NULL
                AND closed_automatically_at IS NULL
            ORDER BY
                start_date
            "#
        )))
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;

        self.attach_children(rows).await
    }

    async fn find_pending_for_hr(&self) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                parent_id IS NULL
                AND approved_by_manager = TRUE
                AND approved_by_hr IS NULL
                AND closed_automatically_at IS NULL
            ORDER BY
                start_date
            "#
        )))
        .fetch_all(&self.pool)
        .await?;

        self.attach_children(rows).await
    }

    async fn has_overlap(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(&sql(r#"
            SELECT EXISTS (
                SELECT
                    1
                FROM
                    leave_requests
                WHERE
                    employee_id = ?
                    AND start_date <= ?
                    AND end_date >= ?
                    AND closed_automatically_at IS NULL
                    AND (approved_by_manager IS NULL OR approved_by_manager = TRUE)
                    AND (approved_by_hr IS NULL OR approved_by_hr = TRUE)
            )
        "#))
        .bind(employee_id)
        .bind(to)
        .bind(from)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn employee_on_leave(&self, employee_id: Uuid, date: NaiveDate) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(&sql(r#"
            SELECT EXISTS (
                SELECT
                    1
                FROM
                    leave_requests
                WHERE
                    employee_id = ?
                    AND ? BETWEEN start_date AND end_date
                    AND closed_automatically_at IS NULL
                    AND approved_by_manager = TRUE
                    AND approved_by_hr = TRUE
            )
        "#))
        .bind(employee_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn save_manager_decision(&self, decision: &GroupDecision) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        for (id, block_decision) in &decision.decisions {
            let (approved, acted_at, rejection_reason) = block_decision.to_columns();
            let guard = if *id == decision.root_id {
                "id = ? AND parent_id IS NULL"
            } else {
                "id = ? AND parent_id IS NOT NULL"
            };

            let result = sqlx::query(&sql(&format!(
                r#"
                UPDATE
                    leave_requests
                SET
                    approved_by_manager = ?,
                    action_by_manager_at = ?,
                    manager_rejection_reason = ?
                WHERE
                    {guard}
                    AND approved_by_manager IS NULL
                    AND closed_automatically_at IS NULL
                "#
            )))
            .bind(approved)
            .bind(acted_at)
            .bind(rejection_reason)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                log::warn!(
                    "Manager decision on leave {} lost to an earlier write",
                    id
                );
                return Ok(false);
            }
        }

        apply_adjustments(&mut tx, &decision.releases).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn save_hr_decision(&self, decision: &GroupDecision) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        for (id, block_decision) in &decision.decisions {
            let (approved, acted_at, rejection_reason) = block_decision.to_columns();

            let result = sqlx::query(&sql(r#"
                UPDATE
                    leave_requests
                SET
                    approved_by_hr = ?,
                    action_by_hr_at = ?,
                    hr_rejection_reason = ?,
                    hr_id = ?
                WHERE
                    id = ?
                    AND approved_by_manager = TRUE
                    AND approved_by_hr IS NULL
                    AND closed_automatically_at IS NULL
            "#))
            .bind(approved)
            .bind(acted_at)
            .bind(rejection_reason)
            .bind(decision.actor_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                log::warn!("HR decision on leave {} lost to an earlier write", id);
                return Ok(false);
            }
        }

        apply_adjustments(&mut tx, &decision.releases).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn find_due_for_closing(&self, until: NaiveDate) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                parent_id IS NULL
                AND leave_type <> ?
                AND start_date <= ?
                AND {AWAITING_DECISION}
            ORDER BY
                start_date
            "#
        )))
        .bind(LeaveType::Sick)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        self.attach_children(rows).await
    }

    async fn close_automatically(&self, root_id: Uuid, closure: &AutoClosure) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let root = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            UPDATE
                leave_requests
            SET
                closed_automatically_at = ?,
                closed_reason = ?
            WHERE
                id = ?
                AND parent_id IS NULL
                AND {AWAITING_DECISION}
            RETURNING
                {LEAVE_COLUMNS}
            "#
        )))
        .bind(closure.at)
        .bind(&closure.reason)
        .bind(root_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(root) = root else {
            return Ok(false);
        };

        // Children decided after the caller's read are skipped here and keep
        // whatever their decision already released.
        let children = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            UPDATE
                leave_requests
            SET
                closed_automatically_at = ?,
                closed_reason = ?
            WHERE
                parent_id = ?
                AND {AWAITING_DECISION}
            RETURNING
                {LEAVE_COLUMNS}
            "#
        )))
        .bind(closure.at)
        .bind(&closure.reason)
        .bind(root_id)
        .fetch_all(&mut *tx)
        .await?;

        let releases: Vec<QuotaAdjustment> = std::iter::once(root)
            .chain(children)
            .map(LeaveRequest::from)
            .filter_map(|block| QuotaAdjustment::release_of(&block))
            .collect();
        apply_adjustments(&mut tx, &releases).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn history(
        &self,
        filter: &LeaveFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<LeaveRequest>> {
        let mut conditions = Conditions::default();
        conditions.push("parent_id IS NULL");
        match filter.scope {
            HistoryScope::Employee(id) => conditions.push_id("employee_id = ?", id),
            HistoryScope::StaffOf(manager_id) => conditions.push_id("manager_id = ?", manager_id),
            HistoryScope::All => {}
        }
        conditions.push_window("created_at", filter.window.as_ref());
        if let Some(status) = filter.status {
            conditions.push(status_clause(status));
        }
        if filter.settled_only {
            conditions.push("(approved_by_manager IS NOT NULL OR closed_automatically_at IS NOT NULL)");
        }

        let (total,) = conditions
            .bind(sqlx::query_as::<_, (i64,)>(&sql(&format!(
                "SELECT COUNT(*) FROM leave_requests{}",
                conditions.where_clause()
            ))))
            .fetch_one(&self.pool)
            .await?;

        let (limit, offset) = page_bounds(page);
        let rows = conditions
            .bind(sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
                r#"
                SELECT
                    {LEAVE_COLUMNS}
                FROM
                    leave_requests
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

        let roots = self.attach_children(rows).await?;
        Ok(Page::new(roots, page, total.max(0) as u64))
    }

    async fn find_approved_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<LeaveRequest>> {
        let rows = sqlx::query_as::<_, LeaveRequestRow>(&sql(&format!(
            r#"
            SELECT
                {LEAVE_COLUMNS}
            FROM
                leave_requests
            WHERE
                start_date <= ?
                AND end_date >= ?
                AND closed_automatically_at IS NULL
                AND approved_by_manager = TRUE
                AND approved_by_hr = TRUE
            ORDER BY
                start_date,
                employee_id
            "#
        )))
        .bind(to)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LeaveRequest::from).collect())
    }
}

/// SQL form of the status derived from the decision columns.
fn status_clause(status: LeaveStatus) -> &'static str {
    match status {
        LeaveStatus::Pending => {
            "(approved_by_manager IS NULL OR approved_by_manager = TRUE) AND approved_by_hr IS NULL AND closed_automatically_at IS NULL"
        }
        LeaveStatus::Approved => {
            "approved_by_manager = TRUE AND approved_by_hr = TRUE AND closed_automatically_at IS NULL"
        }
        LeaveStatus::Rejected => {
            "(approved_by_manager = FALSE OR approved_by_hr = FALSE) AND closed_automatically_at IS NULL"
        }
        LeaveStatus::Closed => "closed_automatically_at IS NOT NULL",
    }
}
