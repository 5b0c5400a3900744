use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};

use merit_core::domain::award::AwardId;
use merit_core::domain::employee::{DepartmentId, EmployeeId};
use merit_core::domain::instance::{
    Cancellation, InstanceId, InstanceProgress, InstanceStatus, InstanceTransition, InstanceView,
    LevelApproval, LevelApprovalId, LevelApprovalStatus, OverdueLevel, PendingApproval,
    WorkflowInstance,
};
use merit_core::domain::role::RoleCode;
use merit_core::domain::workflow::WorkflowDefinitionId;

use super::{
    decode_decimal, decode_optional_time, decode_time, decode_u32, encode_time, CreateOutcome,
    InstanceRepository, RepositoryError,
};
use crate::DbPool;

const INSTANCE_COLUMNS: &str = "id, award_id, definition_id, definition_name, subject_id, \
                                department_id, amount, currency, current_level, level_count, \
                                status, cancelled_by, cancel_reason, started_at, completed_at";

const LEVEL_COLUMNS: &str = "id, instance_id, level_order, approver_role, approver_id, \
                             requires_comment, requires_evidence, timeout_days, status, comments, \
                             evidence_reference, activated_at, decided_at";

pub struct SqlInstanceRepository {
    pool: DbPool,
}

impl SqlInstanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_view(
        &self,
        row: Option<sqlx::sqlite::SqliteRow>,
    ) -> Result<Option<InstanceView>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let instance = row_to_instance(&row)?;
        let levels = sqlx::query(&format!(
            "SELECT {LEVEL_COLUMNS} FROM level_approval WHERE instance_id = ? ORDER BY level_order"
        ))
        .bind(&instance.id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_level)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(InstanceView { instance, levels }))
    }

    async fn instance_for_award(&self, award_id: &str) -> Result<Option<InstanceId>, RepositoryError> {
        let row = sqlx::query("SELECT id FROM workflow_instance WHERE award_id = ?")
            .bind(award_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            row.try_get::<String, _>("id")
                .map(InstanceId)
                .map_err(|e| RepositoryError::Decode(e.to_string()))
        })
        .transpose()
    }
}

fn decode_instance_status(raw: &str) -> Result<InstanceStatus, RepositoryError> {
    InstanceStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown instance status `{raw}`")))
}

fn decode_level_status(raw: &str) -> Result<LevelApprovalStatus, RepositoryError> {
    LevelApprovalStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown level status `{raw}`")))
}

fn row_to_instance(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowInstance, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let award_id: String =
        row.try_get("award_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let definition_id: String =
        row.try_get("definition_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let definition_name: String =
        row.try_get("definition_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: String =
        row.try_get("department_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_level: i64 =
        row.try_get("current_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_count: i64 =
        row.try_get("level_count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cancelled_by: Option<String> =
        row.try_get("cancelled_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cancel_reason: Option<String> =
        row.try_get("cancel_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let started_at: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WorkflowInstance {
        id: InstanceId(id),
        award_id: AwardId(award_id),
        definition_id: WorkflowDefinitionId(definition_id),
        definition_name,
        subject_id: EmployeeId(subject_id),
        department_id: DepartmentId(department_id),
        amount: decode_decimal(&amount)?,
        currency,
        current_level: decode_u32(current_level, "current_level")?,
        level_count: decode_u32(level_count, "level_count")?,
        status: decode_instance_status(&status)?,
        cancellation: cancelled_by.map(|cancelled_by| Cancellation {
            cancelled_by: EmployeeId(cancelled_by),
            reason: cancel_reason.unwrap_or_default(),
        }),
        started_at: decode_time(&started_at)?,
        completed_at: decode_optional_time(completed_at)?,
    })
}

fn row_to_level(row: &sqlx::sqlite::SqliteRow) -> Result<LevelApproval, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let instance_id: String =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_order: i64 =
        row.try_get("level_order").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_role: String =
        row.try_get("approver_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_comment: bool =
        row.try_get("requires_comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_evidence: bool =
        row.try_get("requires_evidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timeout_days: i64 =
        row.try_get("timeout_days").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comments: Option<String> =
        row.try_get("comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let evidence_reference: Option<String> =
        row.try_get("evidence_reference").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let activated_at: Option<String> =
        row.try_get("activated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(LevelApproval {
        id: LevelApprovalId(id),
        instance_id: InstanceId(instance_id),
        level_order: decode_u32(level_order, "level_order")?,
        approver_role: RoleCode(approver_role),
        approver_id: EmployeeId(approver_id),
        requires_comment,
        requires_evidence,
        timeout_days: decode_u32(timeout_days, "timeout_days")?,
        status: decode_level_status(&status)?,
        comments,
        evidence_reference,
        activated_at: decode_optional_time(activated_at)?,
        decided_at: decode_optional_time(decided_at)?,
    })
}

/// Columns shared by the pending and overdue queries, both joining the active level record
/// with its instance.
const ACTIVE_LEVEL_SELECT: &str = "SELECT la.id AS record_id, la.instance_id, la.level_order,
                                          la.approver_role, la.approver_id, la.requires_comment,
                                          la.requires_evidence, la.timeout_days, la.activated_at,
                                          wi.award_id, wi.definition_name, wi.subject_id,
                                          wi.amount, wi.currency, wi.started_at
                                   FROM level_approval la
                                   JOIN workflow_instance wi ON wi.id = la.instance_id
                                   WHERE wi.status = 'in_progress'
                                     AND la.level_order = wi.current_level
                                     AND la.status = 'pending'";

fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingApproval, RepositoryError> {
    let record_id: String =
        row.try_get("record_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let instance_id: String =
        row.try_get("instance_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let award_id: String =
        row.try_get("award_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let definition_name: String =
        row.try_get("definition_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subject_id: String =
        row.try_get("subject_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
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
    let started_at: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let activated_at: Option<String> =
        row.try_get("activated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let timeout_days = decode_u32(timeout_days, "timeout_days")?;
    let activated_at = decode_optional_time(activated_at)?;

    Ok(PendingApproval {
        instance_id: InstanceId(instance_id),
        award_id: AwardId(award_id),
        record_id: LevelApprovalId(record_id),
        definition_name,
        subject_id: EmployeeId(subject_id),
        amount: decode_decimal(&amount)?,
        currency,
        level_order: decode_u32(level_order, "level_order")?,
        approver_role: RoleCode(approver_role),
        requires_comment,
        requires_evidence,
        timeout_days,
        started_at: decode_time(&started_at)?,
        activated_at,
        due_at: activated_at
            .map(|activated_at| activated_at + chrono::Duration::days(i64::from(timeout_days))),
    })
}

async fn insert_level(
    tx: &mut Transaction<'_, Sqlite>,
    level: &LevelApproval,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        "INSERT INTO level_approval ({LEVEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&level.id.0)
    .bind(&level.instance_id.0)
    .bind(i64::from(level.level_order))
    .bind(&level.approver_role.0)
    .bind(&level.approver_id.0)
    .bind(level.requires_comment)
    .bind(level.requires_evidence)
    .bind(i64::from(level.timeout_days))
    .bind(level.status.as_str())
    .bind(&level.comments)
    .bind(&level.evidence_reference)
    .bind(level.activated_at.map(encode_time))
    .bind(level.decided_at.map(encode_time))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl InstanceRepository for SqlInstanceRepository {
    async fn create(
        &self,
        instance: &WorkflowInstance,
        levels: &[LevelApproval],
    ) -> Result<CreateOutcome, RepositoryError> {
        if let Some(existing) = self.instance_for_award(&instance.award_id.0).await? {
            return Ok(CreateOutcome::AlreadySubmitted(existing));
        }

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(&format!(
            "INSERT INTO workflow_instance ({INSTANCE_COLUMNS})
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM workflow_definition WHERE id = ? AND is_active = 1)"
        ))
        .bind(&instance.id.0)
        .bind(&instance.award_id.0)
        .bind(&instance.definition_id.0)
        .bind(&instance.definition_name)
        .bind(&instance.subject_id.0)
        .bind(&instance.department_id.0)
        .bind(instance.amount.to_string())
        .bind(&instance.currency)
        .bind(i64::from(instance.current_level))
        .bind(i64::from(instance.level_count))
        .bind(instance.status.as_str())
        .bind(instance.cancellation.as_ref().map(|c| c.cancelled_by.0.as_str()))
        .bind(instance.cancellation.as_ref().map(|c| c.reason.as_str()))
        .bind(encode_time(instance.started_at))
        .bind(instance.completed_at.map(encode_time))
        .bind(&instance.definition_id.0)
        .execute(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(result) => result,
            Err(error) if is_unique_violation(&error) => {
                tx.rollback().await?;
                return match self.instance_for_award(&instance.award_id.0).await? {
                    Some(existing) => Ok(CreateOutcome::AlreadySubmitted(existing)),
                    None => Err(RepositoryError::Database(error)),
                };
            }
            Err(error) => return Err(error.into()),
        };

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreateOutcome::DefinitionUnavailable);
        }

        for level in levels {
            insert_level(&mut tx, level).await?;
        }
        tx.commit().await?;
        Ok(CreateOutcome::Created)
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceView>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instance WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        self.load_view(row).await
    }

    async fn find_by_award(
        &self,
        award_id: &AwardId,
    ) -> Result<Option<InstanceView>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instance WHERE award_id = ?"
        ))
        .bind(&award_id.0)
        .fetch_optional(&self.pool)
        .await?;
        self.load_view(row).await
    }

    async fn apply_transition(
        &self,
        transition: &InstanceTransition,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let occurred_at = encode_time(transition.occurred_at);

        let instance_update = match transition.progress {
            InstanceProgress::Advance { to_level } => {
                sqlx::query(
                    "UPDATE workflow_instance SET current_level = ?
                     WHERE id = ? AND current_level = ? AND status = 'in_progress'",
                )
                .bind(i64::from(to_level))
                .bind(&transition.instance_id.0)
                .bind(i64::from(transition.expected_level))
                .execute(&mut *tx)
                .await?
            }
            InstanceProgress::Close(status) => {
                sqlx::query(
                    "UPDATE workflow_instance
                     SET status = ?, completed_at = ?, cancelled_by = ?, cancel_reason = ?
                     WHERE id = ? AND current_level = ? AND status = 'in_progress'",
                )
                .bind(status.as_str())
                .bind(&occurred_at)
                .bind(transition.cancellation.as_ref().map(|c| c.cancelled_by.0.as_str()))
                .bind(transition.cancellation.as_ref().map(|c| c.reason.as_str()))
                .bind(&transition.instance_id.0)
                .bind(i64::from(transition.expected_level))
                .execute(&mut *tx)
                .await?
            }
        };
        if instance_update.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(decision) = &transition.decided_record {
            let record_update = sqlx::query(
                "UPDATE level_approval
                 SET status = ?, comments = ?, evidence_reference = ?, decided_at = ?
                 WHERE id = ? AND instance_id = ? AND level_order = ? AND status = 'pending'",
            )
            .bind(decision.status.as_str())
            .bind(&decision.comments)
            .bind(&decision.evidence_reference)
            .bind(&occurred_at)
            .bind(&decision.record_id.0)
            .bind(&transition.instance_id.0)
            .bind(i64::from(transition.expected_level))
            .execute(&mut *tx)
            .await?;
            if record_update.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        if let InstanceProgress::Advance { to_level } = transition.progress {
            sqlx::query(
                "UPDATE level_approval SET activated_at = ?
                 WHERE instance_id = ? AND level_order = ? AND status = 'pending'",
            )
            .bind(&occurred_at)
            .bind(&transition.instance_id.0)
            .bind(i64::from(to_level))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_pending_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<PendingApproval>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{ACTIVE_LEVEL_SELECT} AND la.approver_id = ? ORDER BY wi.started_at ASC, wi.id ASC"
        ))
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_pending).collect()
    }

    async fn list_overdue(&self, at: DateTime<Utc>) -> Result<Vec<OverdueLevel>, RepositoryError> {
        let rows = sqlx::query(&format!("{ACTIVE_LEVEL_SELECT} AND la.activated_at IS NOT NULL"))
            .fetch_all(&self.pool)
            .await?;

        let mut overdue = Vec::new();
        for row in &rows {
            let approver_id: String =
                row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let pending = row_to_pending(row)?;
            let (Some(activated_at), Some(due_at)) = (pending.activated_at, pending.due_at) else {
                continue;
            };
            if due_at > at {
                continue;
            }
            overdue.push(OverdueLevel {
                instance_id: pending.instance_id,
                award_id: pending.award_id,
                record_id: pending.record_id,
                level_order: pending.level_order,
                approver_role: pending.approver_role,
                approver_id: EmployeeId(approver_id),
                activated_at,
                due_at,
            });
        }
        overdue.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.instance_id.cmp(&b.instance_id)));
        Ok(overdue)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use merit_core::domain::award::AwardId;
    use merit_core::domain::employee::{DepartmentId, EmployeeId};
    use merit_core::domain::instance::{
        Cancellation, InstanceId, InstanceProgress, InstanceStatus, InstanceTransition,
        LevelApproval, LevelApprovalId, LevelApprovalStatus, RecordDecision, WorkflowInstance,
    };
    use merit_core::domain::role::{Role, RoleCode, RoleResolution};
    use merit_core::domain::workflow::{ApprovalLevel, WorkflowDefinition, WorkflowDefinitionId};

    use super::SqlInstanceRepository;
    use crate::repositories::{
        CreateOutcome, InstanceRepository, RoleRepository, SqlRoleRepository,
        SqlWorkflowDefinitionRepository, WorkflowDefinitionRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    const ROLES: [&str; 2] = ["direct_manager", "finance_officer"];

    fn started_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    async fn pool_with_definition(is_active: bool) -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let roles = SqlRoleRepository::new(pool.clone());
        for code in ROLES {
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

        SqlWorkflowDefinitionRepository::new(pool.clone())
            .insert(&WorkflowDefinition {
                id: WorkflowDefinitionId("wfd-1".to_string()),
                name: "Two step".to_string(),
                description: None,
                min_value: Decimal::ZERO,
                max_value: None,
                department_id: None,
                is_active,
                levels: ROLES
                    .iter()
                    .zip(1..)
                    .map(|(role, level_order)| ApprovalLevel {
                        level_order,
                        approver_role: RoleCode::new(role),
                        requires_comment: false,
                        requires_evidence: false,
                        timeout_days: 3,
                    })
                    .collect(),
                created_at: started_at() - Duration::days(30),
                updated_at: started_at() - Duration::days(30),
            })
            .await
            .expect("insert definition");
        pool
    }

    fn instance(id: &str, award: &str) -> WorkflowInstance {
        WorkflowInstance {
            id: InstanceId(id.to_string()),
            award_id: AwardId(award.to_string()),
            definition_id: WorkflowDefinitionId("wfd-1".to_string()),
            definition_name: "Two step".to_string(),
            subject_id: EmployeeId("emp-subject".to_string()),
            department_id: DepartmentId("sales".to_string()),
            amount: Decimal::new(500_000, 2),
            currency: "BRL".to_string(),
            current_level: 1,
            level_count: 2,
            status: InstanceStatus::InProgress,
            cancellation: None,
            started_at: started_at(),
            completed_at: None,
        }
    }

    fn levels(instance_id: &str) -> Vec<LevelApproval> {
        [("emp-mgr", ROLES[0]), ("emp-fin", ROLES[1])]
            .iter()
            .zip(1..)
            .map(|((approver, role), level_order)| LevelApproval {
                id: LevelApprovalId(format!("lva-{instance_id}-{level_order}")),
                instance_id: InstanceId(instance_id.to_string()),
                level_order,
                approver_role: RoleCode::new(role),
                approver_id: EmployeeId((*approver).to_string()),
                requires_comment: false,
                requires_evidence: false,
                timeout_days: 3,
                status: LevelApprovalStatus::Pending,
                comments: None,
                evidence_reference: None,
                activated_at: (level_order == 1).then(started_at),
                decided_at: None,
            })
            .collect()
    }

    fn approve_level_one(instance_id: &str) -> InstanceTransition {
        InstanceTransition {
            instance_id: InstanceId(instance_id.to_string()),
            expected_level: 1,
            decided_record: Some(RecordDecision {
                record_id: LevelApprovalId(format!("lva-{instance_id}-1")),
                status: LevelApprovalStatus::Approved,
                comments: Some("ok".to_string()),
                evidence_reference: None,
            }),
            progress: InstanceProgress::Advance { to_level: 2 },
            cancellation: None,
            occurred_at: started_at() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn create_persists_instance_with_levels() {
        let repo = SqlInstanceRepository::new(pool_with_definition(true).await);
        let outcome = repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");
        assert_eq!(outcome, CreateOutcome::Created);

        let view = repo
            .find_by_award(&AwardId("awd-1".to_string()))
            .await
            .expect("find")
            .expect("instance exists");
        assert_eq!(view.instance, instance("wfi-1", "awd-1"));
        assert_eq!(view.levels, levels("wfi-1"));
        assert_eq!(view.active_level().map(|record| record.approver_id.0.as_str()), Some("emp-mgr"));
    }

    #[tokio::test]
    async fn second_instance_for_an_award_is_refused() {
        let repo = SqlInstanceRepository::new(pool_with_definition(true).await);
        repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");

        let outcome = repo.create(&instance("wfi-2", "awd-1"), &levels("wfi-2")).await.expect("create");
        assert_eq!(outcome, CreateOutcome::AlreadySubmitted(InstanceId("wfi-1".to_string())));
        assert!(repo.find_by_id(&InstanceId("wfi-2".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn inactive_definition_blocks_creation() {
        let repo = SqlInstanceRepository::new(pool_with_definition(false).await);
        let outcome = repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");
        assert_eq!(outcome, CreateOutcome::DefinitionUnavailable);
        assert!(repo.find_by_id(&InstanceId("wfi-1".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn stale_transitions_do_not_apply() {
        let repo = SqlInstanceRepository::new(pool_with_definition(true).await);
        repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");

        assert!(repo.apply_transition(&approve_level_one("wfi-1")).await.expect("first"));
        assert!(!repo.apply_transition(&approve_level_one("wfi-1")).await.expect("second"));

        let view = repo
            .find_by_id(&InstanceId("wfi-1".to_string()))
            .await
            .expect("find")
            .expect("instance exists");
        assert_eq!(view.instance.current_level, 2);
        let first = view.level(1).expect("level 1");
        assert_eq!(first.status, LevelApprovalStatus::Approved);
        assert_eq!(first.comments.as_deref(), Some("ok"));
        assert_eq!(view.level(2).and_then(|record| record.activated_at), Some(started_at() + Duration::days(1)));
    }

    #[tokio::test]
    async fn closing_records_completion_and_cancellation() {
        let repo = SqlInstanceRepository::new(pool_with_definition(true).await);
        repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");

        let cancel = InstanceTransition {
            instance_id: InstanceId("wfi-1".to_string()),
            expected_level: 1,
            decided_record: None,
            progress: InstanceProgress::Close(InstanceStatus::Cancelled),
            cancellation: Some(Cancellation {
                cancelled_by: EmployeeId("emp-admin".to_string()),
                reason: "Award withdrawn by HR".to_string(),
            }),
            occurred_at: started_at() + Duration::hours(2),
        };
        assert!(repo.apply_transition(&cancel).await.expect("cancel"));
        assert!(!repo.apply_transition(&approve_level_one("wfi-1")).await.expect("approve after cancel"));

        let view = repo
            .find_by_id(&InstanceId("wfi-1".to_string()))
            .await
            .expect("find")
            .expect("instance exists");
        assert_eq!(view.instance.status, InstanceStatus::Cancelled);
        assert_eq!(view.instance.completed_at, Some(started_at() + Duration::hours(2)));
        assert_eq!(view.instance.cancellation, cancel.cancellation);
        assert!(view.levels.iter().all(|record| record.status == LevelApprovalStatus::Pending));
    }

    #[tokio::test]
    async fn pending_and_overdue_follow_the_current_level() {
        let repo = SqlInstanceRepository::new(pool_with_definition(true).await);
        repo.create(&instance("wfi-1", "awd-1"), &levels("wfi-1")).await.expect("create");

        let manager = EmployeeId("emp-mgr".to_string());
        let finance = EmployeeId("emp-fin".to_string());
        assert_eq!(repo.list_pending_for(&manager).await.expect("pending").len(), 1);
        assert!(repo.list_pending_for(&finance).await.expect("pending").is_empty());

        let overdue = repo.list_overdue(started_at() + Duration::days(3)).await.expect("overdue");
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].approver_id, manager);
        assert!(repo.list_overdue(started_at() + Duration::days(2)).await.expect("overdue").is_empty());

        repo.apply_transition(&approve_level_one("wfi-1")).await.expect("approve");
        assert!(repo.list_pending_for(&manager).await.expect("pending").is_empty());
        let pending = repo.list_pending_for(&finance).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].level_order, 2);
        assert_eq!(pending[0].due_at, Some(started_at() + Duration::days(4)));
    }
}
