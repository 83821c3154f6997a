use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{
    models::{Employee, EmployeeBiodata, EmployeeStatus},
    stores::{EmployeeStore, StoreResult},
    utils::sql,
};

#[derive(Clone)]
pub struct EmployeeRepository {
    pool: PgPool,
}

impl EmployeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeStore for EmployeeRepository {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>(&sql(r#"
            SELECT
                id,
                full_name,
                email,
                manager_id,
                status,
                contract_type
            FROM
                employees
            WHERE
                id = ?
        "#))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(employee)
    }

    async fn get_biodata(&self, employee_id: Uuid) -> StoreResult<Option<EmployeeBiodata>> {
        let biodata = sqlx::query_as::<_, EmployeeBiodata>(&sql(r#"
            SELECT
                employee_id,
                marital_status
            FROM
                employee_biodata
            WHERE
                employee_id = ?
        "#))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(biodata)
    }

    async fn set_status(&self, employee_id: Uuid, status: EmployeeStatus) -> StoreResult<()> {
        sqlx::query(&sql(r#"
            UPDATE
                employees
            SET
                status = ?
            WHERE
                id = ?
        "#))
        .bind(status)
        .bind(employee_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_available(&self) -> StoreResult<u64> {
        let result = sqlx::query(&sql(r#"
            UPDATE
                employees
            SET
                status = ?
            WHERE
                status = ?
        "#))
        .bind(EmployeeStatus::Unavailable)
        .bind(EmployeeStatus::Available)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
