pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notify;
pub mod org;

pub use approvals::{select_applicable, DefinitionRules, ResolutionSnapshot};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::assignment::{ApproverAssignment, AssignmentId, Delegation};
pub use domain::award::{Award, AwardId};
pub use domain::employee::{DepartmentId, Employee, EmployeeId};
pub use domain::instance::{
    InstanceId, InstanceStatus, InstanceView, LevelApproval, LevelApprovalId, LevelApprovalStatus,
    WorkflowInstance,
};
pub use domain::role::{Role, RoleCode, RoleResolution};
pub use domain::workflow::{ApprovalLevel, WorkflowDefinition, WorkflowDefinitionId};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError, WorkflowError};
pub use flows::{FlowAction, InstanceFlow, LevelEvent, TransitionOutcome};
pub use notify::{InMemoryNotifier, NotificationKind, NotificationRequest, Notifier};
pub use org::{InMemoryOrgDirectory, OrgDirectory};
