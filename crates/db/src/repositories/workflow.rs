use std::collections::HashMap;

use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use merit_core::domain::employee::DepartmentId;
use merit_core::domain::role::RoleCode;
use merit_core::domain::workflow::{
    ApprovalLevel, DefinitionFilter, WorkflowDefinition, WorkflowDefinitionId,
};

use super::{
    decode_decimal, decode_time, decode_u32, encode_time, DeleteOutcome, RepositoryError,
    UpdateOutcome, WorkflowDefinitionRepository,
};
use crate::DbPool;

const DEFINITION_COLUMNS: &str = "id, name, description, min_value, max_value, department_id, \
                                  is_active, created_at, updated_at";

pub struct SqlWorkflowDefinitionRepository {
    pool: DbPool,
}

impl SqlWorkflowDefinitionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_levels(
        &self,
        definition_ids: &[String],
    ) -> Result<HashMap<String, Vec<ApprovalLevel>>, RepositoryError> {
        let mut levels: HashMap<String, Vec<ApprovalLevel>> = HashMap::new();
        if definition_ids.is_empty() {
            return Ok(levels);
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT definition_id, level_order, approver_role, requires_comment, requires_evidence,
                    timeout_days
             FROM approval_level WHERE definition_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in definition_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") ORDER BY definition_id, level_order");

        for row in query.build().fetch_all(&self.pool).await? {
            let definition_id: String =
                row.try_get("definition_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            levels.entry(definition_id).or_default().push(row_to_level(&row)?);
        }
        Ok(levels)
    }

    async fn hydrate(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut definitions = rows.iter().map(row_to_definition).collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<String> = definitions.iter().map(|definition| definition.id.0.clone()).collect();
        let mut levels = self.load_levels(&ids).await?;
        for definition in &mut definitions {
            definition.levels = levels.remove(&definition.id.0).unwrap_or_default();
        }
        Ok(definitions)
    }
}

fn row_to_level(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalLevel, RepositoryError> {
    let level_order: i64 =
        row.try_get("level_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_role: String =
        row.try_get("approver_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_comment: bool =
        row.try_get("requires_comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_evidence: bool =
        row.try_get("requires_evidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timeout_days: i64 =
        row.try_get("timeout_days").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalLevel {
        level_order: decode_u32(level_order, "level_order")?,
        approver_role: RoleCode(approver_role),
        requires_comment,
        requires_evidence,
        timeout_days: decode_u32(timeout_days, "timeout_days")?,
    })
}

fn row_to_definition(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowDefinition, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let min_value: String =
        row.try_get("min_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let max_value: Option<String> =
        row.try_get("max_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: Option<String> =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: bool =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowDefinition {
        id: WorkflowDefinitionId(id),
        name,
        description,
        min_value: decode_decimal(&min_value)?,
        max_value: max_value.as_deref().map(decode_decimal).transpose()?,
        department_id: department_id.map(DepartmentId),
        is_active,
        levels: Vec::new(),
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
    })
}

async fn insert_levels(
    tx: &mut Transaction<'_, Sqlite>,
    definition: &WorkflowDefinition,
) -> Result<(), RepositoryError> {
    for level in &definition.levels {
        sqlx::query(
            "INSERT INTO approval_level (definition_id, level_order, approver_role, requires_comment,
                                         requires_evidence, timeout_days)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&definition.id.0)
        .bind(i64::from(level.level_order))
        .bind(&level.approver_role.0)
        .bind(level.requires_comment)
        .bind(level.requires_evidence)
        .bind(i64::from(level.timeout_days))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn count_in_progress(
    tx: &mut Transaction<'_, Sqlite>,
    id: &WorkflowDefinitionId,
) -> Result<u64, RepositoryError> {
    let active: i64 = sqlx::query(
        "SELECT COUNT(*) AS count FROM workflow_instance
         WHERE definition_id = ? AND status = 'in_progress'",
    )
    .bind(&id.0)
    .fetch_one(&mut **tx)
    .await?
    .try_get("count")
    .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(u64::try_from(active).unwrap_or_default())
}

#[async_trait::async_trait]
impl WorkflowDefinitionRepository for SqlWorkflowDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM workflow_definition WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn list(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {DEFINITION_COLUMNS} FROM workflow_definition WHERE 1 = 1"
        ));
        if let Some(department_id) = &filter.department_id {
            query.push(" AND department_id = ").push_bind(department_id.0.clone());
        }
        if let Some(is_active) = filter.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO workflow_definition ({DEFINITION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&definition.id.0)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.min_value.to_string())
        .bind(definition.max_value.map(|max_value| max_value.to_string()))
        .bind(definition.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(definition.is_active)
        .bind(encode_time(definition.created_at))
        .bind(encode_time(definition.updated_at))
        .execute(&mut *tx)
        .await?;

        insert_levels(&mut tx, definition).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        definition: &WorkflowDefinition,
        levels_changed: bool,
    ) -> Result<UpdateOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE workflow_definition
             SET name = ?, description = ?, min_value = ?, max_value = ?, department_id = ?,
                 is_active = ?, updated_at = ?
             WHERE id = ?
               AND (? = 0 OR NOT EXISTS (
                   SELECT 1 FROM workflow_instance
                   WHERE definition_id = workflow_definition.id AND status = 'in_progress'))",
        )
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.min_value.to_string())
        .bind(definition.max_value.map(|max_value| max_value.to_string()))
        .bind(definition.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(definition.is_active)
        .bind(encode_time(definition.updated_at))
        .bind(&definition.id.0)
        .bind(levels_changed)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM workflow_definition WHERE id = ?")
                .bind(&definition.id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;
            return Ok(if exists { UpdateOutcome::Locked } else { UpdateOutcome::NotFound });
        }

        if levels_changed {
            sqlx::query("DELETE FROM approval_level WHERE definition_id = ?")
                .bind(&definition.id.0)
                .execute(&mut *tx)
                .await?;
            insert_levels(&mut tx, definition).await?;
        }

        tx.commit().await?;
        Ok(UpdateOutcome::Updated)
    }

    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<DeleteOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM workflow_definition
             WHERE id = ?
               AND NOT EXISTS (
                   SELECT 1 FROM workflow_instance
                   WHERE definition_id = ? AND status = 'in_progress')",
        )
        .bind(&id.0)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(DeleteOutcome::Deleted);
        }

        let exists = sqlx::query("SELECT 1 FROM workflow_definition WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        let outcome = if exists {
            DeleteOutcome::HasActiveInstances(count_in_progress(&mut tx, id).await?)
        } else {
            DeleteOutcome::NotFound
        };
        tx.rollback().await?;
        Ok(outcome)
    }

    async fn references_role(&self, role: &RoleCode) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM approval_level WHERE approver_role = ? LIMIT 1")
            .bind(&role.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use merit_core::domain::employee::DepartmentId;
    use merit_core::domain::role::{Role, RoleCode, RoleResolution};
    use merit_core::domain::workflow::{
        ApprovalLevel, DefinitionFilter, WorkflowDefinition, WorkflowDefinitionId,
    };

    use super::SqlWorkflowDefinitionRepository;
    use crate::repositories::{
        DeleteOutcome, RoleRepository, SqlRoleRepository, UpdateOutcome,
        WorkflowDefinitionRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let roles = SqlRoleRepository::new(pool.clone());
        for code in ["direct_manager", "finance_officer"] {
            roles
                .save(Role {
                    code: RoleCode::new(code),
                    display_name: code.to_string(),
                    rank: 1,
                    resolution: RoleResolution::Assignment,
                })
                .await
                .expect("save role");
        }
        pool
    }

    fn definition(id: &str, department: Option<&str>, age_minutes: i64) -> WorkflowDefinition {
        let created_at = Utc::now() - Duration::minutes(age_minutes);
        WorkflowDefinition {
            id: WorkflowDefinitionId(id.to_string()),
            name: format!("Definition {id}"),
            description: Some("two step".to_string()),
            min_value: Decimal::new(100_000, 2),
            max_value: None,
            department_id: department.map(|id| DepartmentId(id.to_string())),
            is_active: true,
            levels: ["direct_manager", "finance_officer"]
                .iter()
                .enumerate()
                .map(|(index, role)| ApprovalLevel {
                    level_order: u32::try_from(index + 1).expect("small index"),
                    approver_role: RoleCode::new(role),
                    requires_comment: index == 1,
                    requires_evidence: false,
                    timeout_days: 3,
                })
                .collect(),
            created_at,
            updated_at: created_at,
        }
    }

    async fn insert_in_progress_instance(pool: &DbPool, definition_id: &str) {
        sqlx::query(
            "INSERT INTO workflow_instance (id, award_id, definition_id, definition_name, subject_id,
                                            department_id, amount, currency, current_level,
                                            level_count, status, started_at)
             VALUES ('wfi-1', 'awd-1', ?, 'Definition', 'emp-1', 'sales', '5000', 'BRL', 1, 2,
                     'in_progress', '2025-01-01T00:00:00.000000Z')",
        )
        .bind(definition_id)
        .execute(pool)
        .await
        .expect("insert instance");
    }

    #[tokio::test]
    async fn definitions_round_trip_with_levels_and_filters() {
        let repo = SqlWorkflowDefinitionRepository::new(pool().await);
        let global = definition("wfd-global", None, 10);
        let sales = definition("wfd-sales", Some("sales"), 5);
        repo.insert(&global).await.expect("insert global");
        repo.insert(&sales).await.expect("insert sales");

        let found = repo
            .find_by_id(&WorkflowDefinitionId("wfd-global".to_string()))
            .await
            .expect("find")
            .expect("definition exists");
        assert_eq!(found.levels, global.levels);
        assert_eq!(found.min_value, Decimal::new(100_000, 2));

        let all = repo.list(&DefinitionFilter::default()).await.expect("list");
        assert_eq!(all.iter().map(|d| d.id.0.as_str()).collect::<Vec<_>>(), vec!["wfd-sales", "wfd-global"]);

        let scoped = repo
            .list(&DefinitionFilter {
                department_id: Some(DepartmentId("sales".to_string())),
                is_active: Some(true),
            })
            .await
            .expect("filtered list");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].level_count(), 2);
    }

    #[tokio::test]
    async fn level_edits_are_locked_while_an_instance_is_in_progress() {
        let pool = pool().await;
        let repo = SqlWorkflowDefinitionRepository::new(pool.clone());
        let mut stored = definition("wfd-1", None, 1);
        repo.insert(&stored).await.expect("insert");
        insert_in_progress_instance(&pool, "wfd-1").await;

        stored.levels.truncate(1);
        assert_eq!(repo.update(&stored, true).await.expect("update"), UpdateOutcome::Locked);

        stored.levels = definition("wfd-1", None, 1).levels;
        stored.name = "Renamed workflow".to_string();
        assert_eq!(repo.update(&stored, false).await.expect("update"), UpdateOutcome::Updated);

        let reloaded = repo
            .find_by_id(&WorkflowDefinitionId("wfd-1".to_string()))
            .await
            .expect("find")
            .expect("definition exists");
        assert_eq!(reloaded.name, "Renamed workflow");
        assert_eq!(reloaded.level_count(), 2);

        let missing = definition("wfd-missing", None, 1);
        assert_eq!(repo.update(&missing, false).await.expect("update"), UpdateOutcome::NotFound);
    }

    #[tokio::test]
    async fn delete_is_refused_until_instances_finish() {
        let pool = pool().await;
        let repo = SqlWorkflowDefinitionRepository::new(pool.clone());
        repo.insert(&definition("wfd-1", None, 1)).await.expect("insert");
        insert_in_progress_instance(&pool, "wfd-1").await;
        let id = WorkflowDefinitionId("wfd-1".to_string());

        assert_eq!(repo.delete(&id).await.expect("delete"), DeleteOutcome::HasActiveInstances(1));
        assert!(repo.references_role(&RoleCode::new("finance_officer")).await.expect("refs"));

        sqlx::query(
            "UPDATE workflow_instance SET status = 'approved',
                    completed_at = '2025-01-02T00:00:00.000000Z' WHERE id = 'wfi-1'",
        )
        .execute(&pool)
        .await
        .expect("close instance");

        assert_eq!(repo.delete(&id).await.expect("delete"), DeleteOutcome::Deleted);
        assert_eq!(repo.delete(&id).await.expect("delete"), DeleteOutcome::NotFound);
        assert!(!repo.references_role(&RoleCode::new("finance_officer")).await.expect("refs"));
    }
}
