use chrono::Utc;
use sqlx::Row;

use merit_core::domain::role::{Role, RoleCode, RoleResolution};

use super::{encode_time, RepositoryError, RoleRepository};
use crate::DbPool;

pub struct SqlRoleRepository {
    pool: DbPool,
}

impl SqlRoleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Result<Role, RepositoryError> {
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rank: i64 = row.try_get("rank").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolution: String =
        row.try_get("resolution").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Role {
        code: RoleCode(code),
        display_name,
        rank: u8::try_from(rank)
            .map_err(|_| RepositoryError::Decode(format!("role rank out of range: {rank}")))?,
        resolution: RoleResolution::parse(&resolution).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown role resolution `{resolution}`"))
        })?,
    })
}

#[async_trait::async_trait]
impl RoleRepository for SqlRoleRepository {
    async fn find(&self, code: &RoleCode) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query("SELECT code, display_name, rank, resolution FROM role WHERE code = ?")
            .bind(&code.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_role).transpose()
    }

    async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT code, display_name, rank, resolution FROM role ORDER BY rank ASC, code ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_role).collect()
    }

    async fn save(&self, role: Role) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO role (code, display_name, rank, resolution, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                 display_name = excluded.display_name,
                 rank = excluded.rank,
                 resolution = excluded.resolution",
        )
        .bind(&role.code.0)
        .bind(&role.display_name)
        .bind(i64::from(role.rank))
        .bind(role.resolution.as_str())
        .bind(encode_time(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
