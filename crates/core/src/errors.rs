use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::award::AwardId;
use crate::domain::employee::{DepartmentId, EmployeeId};
use crate::domain::instance::InstanceId;
use crate::domain::role::RoleCode;
use crate::domain::workflow::WorkflowDefinitionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Resolution,
    State,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Resolution => "resolution",
            Self::State => "state",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("levels of workflow definition `{definition_id}` are locked by an in-progress instance")]
    Locked { definition_id: WorkflowDefinitionId },
    #[error("workflow definition `{definition_id}` has {active} in-progress instance(s)")]
    HasActiveInstances { definition_id: WorkflowDefinitionId, active: u64 },
    #[error("employee `{employee_id}` is not an active employee")]
    InvalidTarget { employee_id: EmployeeId },
    #[error("no applicable workflow for department `{department_id}` and amount {amount}")]
    NoApplicableWorkflow { department_id: DepartmentId, amount: Decimal },
    #[error("no approver could be resolved for role `{role}` at level {level}")]
    UnresolvedApprover { level: u32, role: RoleCode },
    #[error("instance `{instance_id}` is not awaiting a decision from `{actor_id}` at its current level")]
    NotCurrentLevel { instance_id: InstanceId, actor_id: EmployeeId },
    #[error("`{actor_id}` is not authorized to act on instance `{instance_id}`")]
    NotAuthorized { instance_id: InstanceId, actor_id: EmployeeId },
    #[error("a comment of at least {min_chars} character(s) is required at level {level}")]
    MissingComment { level: u32, min_chars: usize },
    #[error("an evidence attachment is required at level {level}")]
    MissingEvidence { level: u32 },
    #[error("award `{award_id}` was already submitted as instance `{instance_id}`")]
    AlreadySubmitted { award_id: AwardId, instance_id: InstanceId },
    #[error("role `{role}` is referenced by workflow levels and cannot be redefined")]
    RoleInUse { role: RoleCode },
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDefinition(_) => "invalid_definition",
            Self::NotFound { .. } => "not_found",
            Self::Locked { .. } => "locked",
            Self::HasActiveInstances { .. } => "has_active_instances",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::NoApplicableWorkflow { .. } => "no_applicable_workflow",
            Self::UnresolvedApprover { .. } => "unresolved_approver",
            Self::NotCurrentLevel { .. } => "not_current_level",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::MissingComment { .. } => "missing_comment",
            Self::MissingEvidence { .. } => "missing_evidence",
            Self::AlreadySubmitted { .. } => "already_submitted",
            Self::RoleInUse { .. } => "role_in_use",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDefinition(_)
            | Self::InvalidTarget { .. }
            | Self::MissingComment { .. }
            | Self::MissingEvidence { .. } => ErrorKind::Validation,
            Self::NotCurrentLevel { .. } | Self::NotAuthorized { .. } => ErrorKind::Authorization,
            Self::NotFound { .. }
            | Self::NoApplicableWorkflow { .. }
            | Self::UnresolvedApprover { .. } => ErrorKind::Resolution,
            Self::Locked { .. }
            | Self::HasActiveInstances { .. }
            | Self::AlreadySubmitted { .. }
            | Self::RoleInUse { .. } => ErrorKind::State,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(value))
    }
}

impl ApplicationError {
    pub fn workflow(&self) -> Option<&WorkflowError> {
        match self {
            Self::Domain(DomainError::Workflow(error)) => Some(error),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Workflow(error)) => error.code(),
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Rejected { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("{code}: {message}")]
    Rejected { code: &'static str, kind: ErrorKind, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { code, .. } => code,
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Rejected { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Rejected { code, .. } => match *code {
                "invalid_definition" => "The workflow definition is invalid. Check its levels and value range.",
                "not_found" => "The requested item does not exist.",
                "locked" => "Levels cannot change while an approval using this workflow is in progress.",
                "has_active_instances" => "This workflow still has approvals in progress.",
                "invalid_target" => "The selected employee is not active.",
                "no_applicable_workflow" => "No approval workflow applies to this award.",
                "unresolved_approver" => "An approval level has no one assigned to its role.",
                "not_current_level" => "This item already moved on; no decision from you is pending.",
                "not_authorized" => "You are not authorized to act on this step.",
                "missing_comment" => "A comment is required for this decision.",
                "missing_evidence" => "An evidence attachment is required at this level.",
                "already_submitted" => "This award was already submitted for approval.",
                "role_in_use" => "This role is used by a workflow and cannot be changed.",
                _ => "The request could not be processed. Check inputs and try again.",
            },
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::Workflow(error)) => Self::Rejected {
                code: error.code(),
                kind: error.kind(),
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{employee::EmployeeId, instance::InstanceId};
    use crate::errors::{ApplicationError, ErrorKind, InterfaceError, WorkflowError};

    #[test]
    fn workflow_error_maps_to_rejected_interface_error_with_stable_code() {
        let interface = ApplicationError::from(WorkflowError::NotCurrentLevel {
            instance_id: InstanceId("wfi-1".to_owned()),
            actor_id: EmployeeId("emp-1".to_owned()),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Rejected {
                code: "not_current_level",
                kind: ErrorKind::Authorization,
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "This item already moved on; no decision from you is pending."
        );
    }

    #[test]
    fn not_authorized_and_not_current_level_render_distinct_messages() {
        let instance_id = InstanceId("wfi-2".to_owned());
        let actor_id = EmployeeId("emp-2".to_owned());
        let not_current = ApplicationError::from(WorkflowError::NotCurrentLevel {
            instance_id: instance_id.clone(),
            actor_id: actor_id.clone(),
        })
        .into_interface("req-2");
        let not_authorized =
            ApplicationError::from(WorkflowError::NotAuthorized { instance_id, actor_id })
                .into_interface("req-2");

        assert_ne!(not_current.code(), not_authorized.code());
        assert_ne!(not_current.user_message(), not_authorized.user_message());
    }

    #[test]
    fn every_workflow_error_has_a_kind() {
        assert_eq!(
            WorkflowError::InvalidDefinition("levels must not be empty".to_owned()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(WorkflowError::not_found("award", "awd-1").kind(), ErrorKind::Resolution);
        assert_eq!(
            WorkflowError::MissingEvidence { level: 2 }.code(),
            "missing_evidence"
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid admin role".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
