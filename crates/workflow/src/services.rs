use std::sync::Arc;

use merit_core::audit::AuditSink;
use merit_core::config::WorkflowConfig;
use merit_core::notify::Notifier;
use merit_core::org::OrgDirectory;
use merit_db::repositories::{
    AssignmentRepository, AwardRepository, InMemoryAssignmentRepository, InMemoryAwardRepository,
    InMemoryRoleRepository, InMemoryWorkflowStore, InstanceRepository, RoleRepository,
    SqlAssignmentRepository, SqlAwardRepository, SqlInstanceRepository, SqlOrgDirectory,
    SqlRoleRepository, SqlWorkflowDefinitionRepository, WorkflowDefinitionRepository,
};
use merit_db::DbPool;

use crate::directory::ApproverDirectory;
use crate::engine::{EnginePorts, EngineSettings, WorkflowEngine};
use crate::registry::WorkflowRegistry;

/// Every port the three services read from or write to.
#[derive(Clone)]
pub struct Stores {
    pub roles: Arc<dyn RoleRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub definitions: Arc<dyn WorkflowDefinitionRepository>,
    pub instances: Arc<dyn InstanceRepository>,
    pub awards: Arc<dyn AwardRepository>,
    pub org: Arc<dyn OrgDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn sqlite(pool: DbPool, notifier: Arc<dyn Notifier>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            roles: Arc::new(SqlRoleRepository::new(pool.clone())),
            assignments: Arc::new(SqlAssignmentRepository::new(pool.clone())),
            definitions: Arc::new(SqlWorkflowDefinitionRepository::new(pool.clone())),
            instances: Arc::new(SqlInstanceRepository::new(pool.clone())),
            awards: Arc::new(SqlAwardRepository::new(pool.clone())),
            org: Arc::new(SqlOrgDirectory::new(pool)),
            notifier,
            audit,
        }
    }

    /// Definitions and instances share one store so level locking sees live instances.
    pub fn in_memory(
        org: Arc<dyn OrgDirectory>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let workflows = Arc::new(InMemoryWorkflowStore::default());
        Self {
            roles: Arc::new(InMemoryRoleRepository::default()),
            assignments: Arc::new(InMemoryAssignmentRepository::default()),
            definitions: workflows.clone(),
            instances: workflows,
            awards: Arc::new(InMemoryAwardRepository::default()),
            org,
            notifier,
            audit,
        }
    }
}

#[derive(Clone)]
pub struct WorkflowServices {
    pub directory: Arc<ApproverDirectory>,
    pub registry: Arc<WorkflowRegistry>,
    pub engine: Arc<WorkflowEngine>,
}

impl WorkflowServices {
    pub fn new(stores: Stores, config: &WorkflowConfig) -> Self {
        let directory = Arc::new(ApproverDirectory::new(
            stores.roles.clone(),
            stores.assignments,
            stores.definitions.clone(),
            stores.org.clone(),
            stores.audit.clone(),
        ));
        let registry = Arc::new(WorkflowRegistry::new(
            stores.definitions,
            stores.roles,
            stores.audit.clone(),
            config.default_timeout_days,
        ));
        let engine = Arc::new(WorkflowEngine::new(
            registry.clone(),
            directory.clone(),
            EnginePorts {
                instances: stores.instances,
                awards: stores.awards,
                org: stores.org,
                notifier: stores.notifier,
                audit: stores.audit,
            },
            EngineSettings::from(config),
        ));

        Self { directory, registry, engine }
    }
}
