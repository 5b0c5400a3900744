use sqlx::Row;

use merit_core::domain::award::{Award, AwardId};
use merit_core::domain::employee::{DepartmentId, EmployeeId};

use super::{decode_decimal, AwardRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAwardRepository {
    pool: DbPool,
}

impl SqlAwardRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_award(row: &sqlx::sqlite::SqliteRow) -> Result<Award, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: String =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reference: Option<String> =
        row.try_get("reference").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Award {
        id: AwardId(id),
        subject_id: EmployeeId(subject_id),
        department_id: DepartmentId(department_id),
        amount: decode_decimal(&amount)?,
        currency,
        reference,
    })
}

#[async_trait::async_trait]
impl AwardRepository for SqlAwardRepository {
    async fn find_by_id(&self, id: &AwardId) -> Result<Option<Award>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, subject_id, department_id, amount, currency, reference
             FROM award WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_award).transpose()
    }

    async fn save(&self, award: Award) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO award (id, subject_id, department_id, amount, currency, reference)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 subject_id = excluded.subject_id,
                 department_id = excluded.department_id,
                 amount = excluded.amount,
                 currency = excluded.currency,
                 reference = excluded.reference",
        )
        .bind(&award.id.0)
        .bind(&award.subject_id.0)
        .bind(&award.department_id.0)
        .bind(award.amount.to_string())
        .bind(&award.currency)
        .bind(&award.reference)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
