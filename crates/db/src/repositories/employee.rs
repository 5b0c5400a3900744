use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite};

use merit_core::domain::employee::{DepartmentId, Employee, EmployeeId};
use merit_core::errors::ApplicationError;
use merit_core::org::OrgDirectory;

use super::RepositoryError;
use crate::DbPool;

/// Org Directory backed by the local `employee` read model.
#[derive(Clone)]
pub struct SqlOrgDirectory {
    pool: DbPool,
}

impl SqlOrgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, employee: &Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, name, department_id, manager_id, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 department_id = excluded.department_id,
                 manager_id = excluded.manager_id,
                 active = excluded.active",
        )
        .bind(&employee.id.0)
        .bind(&employee.name)
        .bind(employee.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(employee.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(employee.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: Option<String> =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Employee {
        id: EmployeeId(id),
        name,
        department_id: department_id.map(DepartmentId),
        manager_id: manager_id.map(EmployeeId),
        active,
    })
}

#[async_trait]
impl OrgDirectory for SqlOrgDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, ApplicationError> {
        let row = sqlx::query(
            "SELECT id, name, department_id, manager_id, active FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(row_to_employee).transpose()?)
    }

    async fn find_employees(&self, ids: &[EmployeeId]) -> Result<Vec<Employee>, ApplicationError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, name, department_id, manager_id, active FROM employee WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0.clone());
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await.map_err(RepositoryError::from)?;
        Ok(rows.iter().map(row_to_employee).collect::<Result<Vec<_>, _>>()?)
    }
}
