//! Application services of the award approval workflow: the approver directory, the workflow
//! registry and the instance engine, wired over the storage and notification ports.

pub mod context;
pub mod directory;
pub mod engine;
pub mod messages;
pub mod registry;
pub mod services;
pub mod tracing_sinks;

pub use context::RequestContext;
pub use directory::{ApproverDirectory, AssignmentRequest, DelegationRequest, RoleSpec};
pub use engine::{EnginePorts, EngineSettings, WorkflowEngine};
pub use registry::WorkflowRegistry;
pub use services::{Stores, WorkflowServices};
pub use tracing_sinks::{TracingAuditSink, TracingNotifier};
