use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use merit_core::approvals::{apply_patch, build_definition, select_applicable, DefinitionRules};
use merit_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use merit_core::domain::employee::DepartmentId;
use merit_core::domain::workflow::{
    DefinitionFilter, DefinitionPatch, NewWorkflowDefinition, WorkflowDefinition,
    WorkflowDefinitionId,
};
use merit_core::errors::{ApplicationError, WorkflowError};
use merit_db::repositories::{
    DeleteOutcome, RoleRepository, UpdateOutcome, WorkflowDefinitionRepository,
};

use crate::context::RequestContext;

/// Workflow templates and the rule that picks one for an award.
pub struct WorkflowRegistry {
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    roles: Arc<dyn RoleRepository>,
    audit: Arc<dyn AuditSink>,
    default_timeout_days: u32,
}

impl WorkflowRegistry {
    pub fn new(
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        roles: Arc<dyn RoleRepository>,
        audit: Arc<dyn AuditSink>,
        default_timeout_days: u32,
    ) -> Self {
        Self { definitions, roles, audit, default_timeout_days }
    }

    async fn rules(&self) -> Result<DefinitionRules, ApplicationError> {
        let known_roles = self.roles.list().await?.into_iter().map(|role| role.code).collect();
        Ok(DefinitionRules { known_roles, default_timeout_days: self.default_timeout_days })
    }

    pub async fn create(
        &self,
        input: NewWorkflowDefinition,
        context: &RequestContext,
    ) -> Result<WorkflowDefinition, ApplicationError> {
        let rules = self.rules().await?;
        let id = WorkflowDefinitionId(format!("wfd-{}", uuid::Uuid::new_v4()));
        let definition = build_definition(id, &input, &rules, Utc::now()).map_err(|error| {
            self.refuse(context, "registry.definition.refused", None, &error);
            error
        })?;

        self.definitions.insert(&definition).await?;

        self.audit.emit(
            context
                .audit(None)
                .event("registry.definition.created", AuditCategory::Registry, AuditOutcome::Success)
                .with_metadata("definition_id", definition.id.0.clone())
                .with_metadata("level_count", definition.level_count().to_string()),
        );
        info!(
            event_name = "registry.definition.created",
            correlation_id = %context.correlation_id,
            definition_id = %definition.id,
            name = %definition.name,
            level_count = definition.level_count(),
            "workflow definition created"
        );
        Ok(definition)
    }

    pub async fn get(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, ApplicationError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("workflow definition", id).into())
    }

    /// Newest first.
    pub async fn list(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinition>, ApplicationError> {
        Ok(self.definitions.list(filter).await?)
    }

    /// Level edits are refused while an in-progress instance uses the definition; they only
    /// apply to instances started afterwards.
    pub async fn update(
        &self,
        id: &WorkflowDefinitionId,
        patch: DefinitionPatch,
        context: &RequestContext,
    ) -> Result<WorkflowDefinition, ApplicationError> {
        let current = self.get(id).await?;
        let rules = self.rules().await?;
        let updated = apply_patch(&current, &patch, &rules, Utc::now()).map_err(|error| {
            self.refuse(context, "registry.definition.refused", Some(id), &error);
            error
        })?;

        let levels_changed = patch.touches_levels() && updated.levels != current.levels;
        match self.definitions.update(&updated, levels_changed).await? {
            UpdateOutcome::Updated => {}
            UpdateOutcome::NotFound => return Err(WorkflowError::not_found("workflow definition", id).into()),
            UpdateOutcome::Locked => {
                let error = WorkflowError::Locked { definition_id: id.clone() };
                self.refuse(context, "registry.definition.refused", Some(id), &error);
                return Err(error.into());
            }
        }

        self.audit.emit(
            context
                .audit(None)
                .event("registry.definition.updated", AuditCategory::Registry, AuditOutcome::Success)
                .with_metadata("definition_id", id.0.clone())
                .with_metadata("levels_changed", levels_changed.to_string()),
        );
        info!(
            event_name = "registry.definition.updated",
            correlation_id = %context.correlation_id,
            definition_id = %id,
            levels_changed,
            "workflow definition updated"
        );
        Ok(updated)
    }

    pub async fn delete(
        &self,
        id: &WorkflowDefinitionId,
        context: &RequestContext,
    ) -> Result<(), ApplicationError> {
        match self.definitions.delete(id).await? {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::NotFound => return Err(WorkflowError::not_found("workflow definition", id).into()),
            DeleteOutcome::HasActiveInstances(active) => {
                let error = WorkflowError::HasActiveInstances { definition_id: id.clone(), active };
                self.refuse(context, "registry.definition.refused", Some(id), &error);
                return Err(error.into());
            }
        }

        self.audit.emit(
            context
                .audit(None)
                .event("registry.definition.deleted", AuditCategory::Registry, AuditOutcome::Success)
                .with_metadata("definition_id", id.0.clone()),
        );
        info!(
            event_name = "registry.definition.deleted",
            correlation_id = %context.correlation_id,
            definition_id = %id,
            "workflow definition deleted"
        );
        Ok(())
    }

    /// A hard stop when nothing matches: callers never fall back to a default workflow.
    pub async fn find_applicable(
        &self,
        department_id: &DepartmentId,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<WorkflowDefinition, ApplicationError> {
        let active = self
            .definitions
            .list(&DefinitionFilter { department_id: None, is_active: Some(true) })
            .await?;

        select_applicable(&active, department_id, amount, at).cloned().ok_or_else(|| {
            WorkflowError::NoApplicableWorkflow { department_id: department_id.clone(), amount }.into()
        })
    }

    fn refuse(
        &self,
        context: &RequestContext,
        event_type: &str,
        definition_id: Option<&WorkflowDefinitionId>,
        error: &WorkflowError,
    ) {
        let definition_id = definition_id.map(|id| id.0.as_str()).unwrap_or("");
        warn!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            definition_id,
            code = error.code(),
            error = %error,
            "registry request refused"
        );
        self.audit.emit(
            context
                .audit(None)
                .event(event_type, AuditCategory::Registry, AuditOutcome::Rejected)
                .with_metadata("definition_id", definition_id)
                .with_metadata("code", error.code()),
        );
    }
}
