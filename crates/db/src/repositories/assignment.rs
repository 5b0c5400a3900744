use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};

use merit_core::domain::assignment::{ApproverAssignment, AssignmentId, Delegation};
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::role::RoleCode;

use super::{decode_optional_time, decode_time, encode_time, AssignmentRepository, RepositoryError};
use crate::DbPool;

const ASSIGNMENT_COLUMNS: &str = "id, role_code, employee_id, starts_at, ends_at, active, \
                                  delegated_by, delegation_reason, created_at";

pub struct SqlAssignmentRepository {
    pool: DbPool,
}

impl SqlAssignmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_assignment(row: &sqlx::sqlite::SqliteRow) -> Result<ApproverAssignment, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_code: String =
        row.try_get("role_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let starts_at: String =
        row.try_get("starts_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let ends_at: Option<String> =
        row.try_get("ends_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delegated_by: Option<String> =
        row.try_get("delegated_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delegation_reason: Option<String> =
        row.try_get("delegation_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApproverAssignment {
        id: AssignmentId(id),
        role: RoleCode(role_code),
        employee_id: EmployeeId(employee_id),
        starts_at: decode_time(&starts_at)?,
        ends_at: decode_optional_time(ends_at)?,
        active,
        delegation: delegated_by.map(|delegated_by| Delegation {
            delegated_by: EmployeeId(delegated_by),
            reason: delegation_reason.unwrap_or_default(),
        }),
        created_at: decode_time(&created_at)?,
    })
}

#[async_trait::async_trait]
impl AssignmentRepository for SqlAssignmentRepository {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<ApproverAssignment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM approver_assignment WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_assignment).transpose()
    }

    async fn list_active_for_roles(
        &self,
        roles: &[RoleCode],
    ) -> Result<Vec<ApproverAssignment>, RepositoryError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM approver_assignment WHERE active = 1 AND role_code IN ("
        ));
        let mut separated = query.separated(", ");
        for role in roles {
            separated.push_bind(role.0.clone());
        }
        separated.push_unseparated(") ORDER BY created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApproverAssignment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM approver_assignment
             WHERE employee_id = ? OR delegated_by = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&employee_id.0)
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_assignment).collect()
    }

    async fn insert(&self, assignment: ApproverAssignment) -> Result<(), RepositoryError> {
        let (delegated_by, delegation_reason) = match &assignment.delegation {
            Some(delegation) => {
                (Some(delegation.delegated_by.0.clone()), Some(delegation.reason.clone()))
            }
            None => (None, None),
        };

        sqlx::query(&format!(
            "INSERT INTO approver_assignment ({ASSIGNMENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&assignment.id.0)
        .bind(&assignment.role.0)
        .bind(&assignment.employee_id.0)
        .bind(encode_time(assignment.starts_at))
        .bind(assignment.ends_at.map(encode_time))
        .bind(assignment.active)
        .bind(delegated_by)
        .bind(delegation_reason)
        .bind(encode_time(assignment.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke(&self, id: &AssignmentId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let at = encode_time(at);
        let result = sqlx::query(
            "UPDATE approver_assignment
             SET active = 0,
                 ends_at = CASE WHEN ends_at IS NULL OR ends_at > ? THEN ? ELSE ends_at END
             WHERE id = ? AND active = 1",
        )
        .bind(&at)
        .bind(&at)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
