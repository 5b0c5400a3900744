use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use merit_core::domain::assignment::{ApproverAssignment, AssignmentId};
use merit_core::domain::award::{Award, AwardId};
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::instance::{
    InstanceId, InstanceTransition, InstanceView, LevelApproval, OverdueLevel, PendingApproval,
    WorkflowInstance,
};
use merit_core::domain::role::{Role, RoleCode};
use merit_core::domain::workflow::{DefinitionFilter, WorkflowDefinition, WorkflowDefinitionId};
use merit_core::errors::ApplicationError;

pub mod assignment;
pub mod award;
pub mod employee;
pub mod instance;
pub mod memory;
pub mod notification;
pub mod role;
pub mod workflow;

pub use assignment::SqlAssignmentRepository;
pub use award::SqlAwardRepository;
pub use employee::SqlOrgDirectory;
pub use instance::SqlInstanceRepository;
pub use memory::{
    InMemoryAssignmentRepository, InMemoryAwardRepository, InMemoryRoleRepository,
    InMemoryWorkflowStore,
};
pub use notification::{SqlNotifier, StoredNotification};
pub use role::SqlRoleRepository;
pub use workflow::SqlWorkflowDefinitionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    /// Levels were edited while an in-progress instance references the definition.
    Locked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    HasActiveInstances(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadySubmitted(InstanceId),
    /// The definition was deleted or deactivated between selection and creation.
    DefinitionUnavailable,
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find(&self, code: &RoleCode) -> Result<Option<Role>, RepositoryError>;
    /// Ordered by rank, then code.
    async fn list(&self) -> Result<Vec<Role>, RepositoryError>;
    async fn save(&self, role: Role) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<ApproverAssignment>, RepositoryError>;

    /// Active (not revoked) assignments of the given roles, read in one statement.
    async fn list_active_for_roles(
        &self,
        roles: &[RoleCode],
    ) -> Result<Vec<ApproverAssignment>, RepositoryError>;

    /// Assignments bound to the employee or delegated by them, revoked ones included, oldest first.
    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApproverAssignment>, RepositoryError>;

    async fn insert(&self, assignment: ApproverAssignment) -> Result<(), RepositoryError>;

    /// Returns false when the id is unknown or the assignment was already revoked.
    async fn revoke(&self, id: &AssignmentId, at: DateTime<Utc>) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &DefinitionFilter)
        -> Result<Vec<WorkflowDefinition>, RepositoryError>;

    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError>;

    /// When `levels_changed`, the write is refused while any in-progress instance references
    /// the definition; the check and the write are atomic.
    async fn update(
        &self,
        definition: &WorkflowDefinition,
        levels_changed: bool,
    ) -> Result<UpdateOutcome, RepositoryError>;

    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<DeleteOutcome, RepositoryError>;

    async fn references_role(&self, role: &RoleCode) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Persists the instance and all its level records in one unit, provided the definition
    /// still exists and is active and the award has no instance yet.
    async fn create(
        &self,
        instance: &WorkflowInstance,
        levels: &[LevelApproval],
    ) -> Result<CreateOutcome, RepositoryError>;

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceView>, RepositoryError>;

    async fn find_by_award(&self, award_id: &AwardId)
        -> Result<Option<InstanceView>, RepositoryError>;

    /// Applies the transition only if the instance is still in progress at
    /// `expected_level` and the decided record is still pending. Returns whether it applied.
    async fn apply_transition(
        &self,
        transition: &InstanceTransition,
    ) -> Result<bool, RepositoryError>;

    /// Records bound to the approver that are pending at their instance's current level,
    /// oldest instance first.
    async fn list_pending_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<PendingApproval>, RepositoryError>;

    /// Active levels whose timeout window ended at or before `at`, earliest due first.
    async fn list_overdue(&self, at: DateTime<Utc>) -> Result<Vec<OverdueLevel>, RepositoryError>;
}

#[async_trait]
pub trait AwardRepository: Send + Sync {
    async fn find_by_id(&self, id: &AwardId) -> Result<Option<Award>, RepositoryError>;
    async fn save(&self, award: Award) -> Result<(), RepositoryError>;
}

/// Fixed microsecond precision keeps lexical order equal to chronological order.
pub fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_time(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub fn decode_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.as_deref().map(decode_time).transpose()
}

pub fn decode_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid decimal `{raw}`: {e}")))
}

pub(crate) fn decode_u32(raw: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {raw}")))
}
