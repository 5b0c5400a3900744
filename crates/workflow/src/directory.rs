use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use merit_core::approvals::ResolutionSnapshot;
use merit_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use merit_core::domain::assignment::{ApproverAssignment, AssignmentId, Delegation};
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::role::{Role, RoleCode, RoleResolution};
use merit_core::errors::{ApplicationError, WorkflowError};
use merit_core::org::OrgDirectory;
use merit_db::repositories::{AssignmentRepository, RoleRepository, WorkflowDefinitionRepository};

use crate::context::RequestContext;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RoleSpec {
    pub code: String,
    pub display_name: String,
    #[serde(default)]
    pub rank: u8,
    #[serde(default)]
    pub resolution: RoleResolution,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AssignmentRequest {
    pub role: RoleCode,
    pub employee_id: EmployeeId,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DelegationRequest {
    pub role: RoleCode,
    pub from_employee_id: EmployeeId,
    pub to_employee_id: EmployeeId,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Who holds which role, and when.
pub struct ApproverDirectory {
    roles: Arc<dyn RoleRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    org: Arc<dyn OrgDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl ApproverDirectory {
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        org: Arc<dyn OrgDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { roles, assignments, definitions, org, audit }
    }

    pub async fn define_role(
        &self,
        spec: RoleSpec,
        context: &RequestContext,
    ) -> Result<Role, ApplicationError> {
        let code = RoleCode::new(&spec.code);
        if code.0.is_empty()
            || !code.0.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(WorkflowError::InvalidDefinition(format!(
                "role code `{}` must be non-empty snake_case",
                spec.code
            ))
            .into());
        }
        let display_name = spec.display_name.trim();
        if display_name.is_empty() {
            return Err(
                WorkflowError::InvalidDefinition("role display name is required".to_owned()).into()
            );
        }

        let role = Role {
            code: code.clone(),
            display_name: display_name.to_owned(),
            rank: spec.rank,
            resolution: spec.resolution,
        };

        if let Some(existing) = self.roles.find(&code).await? {
            if existing == role {
                return Ok(existing);
            }
            if self.definitions.references_role(&code).await? {
                self.refuse(context, "directory.role.refused", "role_in_use", &code.0);
                return Err(WorkflowError::RoleInUse { role: code }.into());
            }
        }

        self.roles.save(role.clone()).await?;

        self.audit.emit(
            context
                .audit(None)
                .event("directory.role.defined", AuditCategory::Directory, AuditOutcome::Success)
                .with_metadata("role", code.0.clone())
                .with_metadata("resolution", role.resolution.as_str()),
        );
        info!(
            event_name = "directory.role.defined",
            correlation_id = %context.correlation_id,
            role = %code,
            resolution = role.resolution.as_str(),
            "role defined"
        );
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ApplicationError> {
        Ok(self.roles.list().await?)
    }

    pub async fn role(&self, code: &RoleCode) -> Result<Role, ApplicationError> {
        self.roles
            .find(code)
            .await?
            .ok_or_else(|| WorkflowError::not_found("role", code).into())
    }

    /// Loads every assignment of `roles` plus the status of each employee they bind, along with
    /// `extra_employees` (e.g. a subject's manager), in one pass.
    pub async fn snapshot(
        &self,
        roles: &[RoleCode],
        extra_employees: &[EmployeeId],
    ) -> Result<ResolutionSnapshot, ApplicationError> {
        let assignments = self.assignments.list_active_for_roles(roles).await?;
        let mut employee_ids = ResolutionSnapshot::referenced_employees(&assignments);
        employee_ids.extend(extra_employees.iter().cloned());
        employee_ids.sort();
        employee_ids.dedup();

        let employees = self.org.find_employees(&employee_ids).await?;
        Ok(ResolutionSnapshot::new(assignments, employees))
    }

    /// The single effective holder of `role` at `at`.
    pub async fn resolve(
        &self,
        role: &RoleCode,
        at: DateTime<Utc>,
    ) -> Result<EmployeeId, ApplicationError> {
        let role = self.role(role).await?;
        let snapshot = self.snapshot(std::slice::from_ref(&role.code), &[]).await?;
        snapshot
            .holder(&role.code, at)
            .ok_or_else(|| WorkflowError::not_found("approver", &role.code).into())
    }

    pub async fn assign(
        &self,
        request: AssignmentRequest,
        context: &RequestContext,
    ) -> Result<ApproverAssignment, ApplicationError> {
        let role = self.role(&RoleCode::new(&request.role.0)).await?;
        validate_interval(request.starts_at, request.ends_at)?;
        self.ensure_active(&request.employee_id, context).await?;

        let assignment = ApproverAssignment {
            id: new_assignment_id(),
            role: role.code,
            employee_id: request.employee_id,
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            active: true,
            delegation: None,
            created_at: Utc::now(),
        };
        self.assignments.insert(assignment.clone()).await?;

        self.audit.emit(
            context
                .audit(None)
                .event("directory.assignment.created", AuditCategory::Directory, AuditOutcome::Success)
                .with_metadata("assignment_id", assignment.id.0.clone())
                .with_metadata("role", assignment.role.0.clone())
                .with_metadata("employee_id", assignment.employee_id.0.clone()),
        );
        info!(
            event_name = "directory.assignment.created",
            correlation_id = %context.correlation_id,
            assignment_id = %assignment.id,
            role = %assignment.role,
            employee_id = %assignment.employee_id,
            "approver assigned"
        );
        Ok(assignment)
    }

    /// Idempotent: unknown and already revoked ids succeed without change.
    pub async fn revoke(
        &self,
        id: &AssignmentId,
        context: &RequestContext,
    ) -> Result<(), ApplicationError> {
        let revoked = self.assignments.revoke(id, Utc::now()).await?;

        if revoked {
            self.audit.emit(
                context
                    .audit(None)
                    .event("directory.assignment.revoked", AuditCategory::Directory, AuditOutcome::Success)
                    .with_metadata("assignment_id", id.0.clone()),
            );
        }
        info!(
            event_name = "directory.assignment.revoked",
            correlation_id = %context.correlation_id,
            assignment_id = %id,
            changed = revoked,
            "approver assignment revoked"
        );
        Ok(())
    }

    /// Declarative: the delegator is not required to hold the role.
    pub async fn delegate(
        &self,
        request: DelegationRequest,
        context: &RequestContext,
    ) -> Result<ApproverAssignment, ApplicationError> {
        let role = self.role(&RoleCode::new(&request.role.0)).await?;
        validate_interval(request.starts_at, request.ends_at)?;
        self.ensure_active(&request.to_employee_id, context).await?;

        let assignment = ApproverAssignment {
            id: new_assignment_id(),
            role: role.code,
            employee_id: request.to_employee_id,
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            active: true,
            delegation: Some(Delegation {
                delegated_by: request.from_employee_id,
                reason: request.reason.trim().to_owned(),
            }),
            created_at: Utc::now(),
        };
        self.assignments.insert(assignment.clone()).await?;

        let delegated_by = assignment.delegated_by().map(|id| id.0.clone()).unwrap_or_default();
        self.audit.emit(
            context
                .audit(None)
                .event("directory.assignment.delegated", AuditCategory::Directory, AuditOutcome::Success)
                .with_metadata("assignment_id", assignment.id.0.clone())
                .with_metadata("role", assignment.role.0.clone())
                .with_metadata("employee_id", assignment.employee_id.0.clone())
                .with_metadata("delegated_by", delegated_by.clone()),
        );
        info!(
            event_name = "directory.assignment.delegated",
            correlation_id = %context.correlation_id,
            assignment_id = %assignment.id,
            role = %assignment.role,
            employee_id = %assignment.employee_id,
            delegated_by = %delegated_by,
            "approver role delegated"
        );
        Ok(assignment)
    }

    /// Revoked assignments included, oldest first.
    pub async fn list_assignments(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApproverAssignment>, ApplicationError> {
        Ok(self.assignments.list_for_employee(employee_id).await?)
    }

    async fn ensure_active(
        &self,
        employee_id: &EmployeeId,
        context: &RequestContext,
    ) -> Result<(), ApplicationError> {
        let active = self.org.find_employee(employee_id).await?.is_some_and(|employee| employee.active);
        if active {
            return Ok(());
        }
        self.refuse(context, "directory.assignment.refused", "invalid_target", &employee_id.0);
        Err(WorkflowError::InvalidTarget { employee_id: employee_id.clone() }.into())
    }

    fn refuse(&self, context: &RequestContext, event_type: &str, code: &str, subject: &str) {
        warn!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            code,
            subject,
            "directory request refused"
        );
        self.audit.emit(
            context
                .audit(None)
                .event(event_type, AuditCategory::Directory, AuditOutcome::Rejected)
                .with_metadata("code", code)
                .with_metadata("subject", subject),
        );
    }
}

fn validate_interval(
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), WorkflowError> {
    match ends_at {
        Some(ends_at) if ends_at <= starts_at => Err(WorkflowError::InvalidDefinition(format!(
            "assignment interval is empty: ends at {ends_at} which is not after {starts_at}"
        ))),
        _ => Ok(()),
    }
}

fn new_assignment_id() -> AssignmentId {
    AssignmentId(format!("asg-{}", uuid::Uuid::new_v4()))
}
