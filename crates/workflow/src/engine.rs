use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use merit_core::audit::{AuditCategory, AuditOutcome, AuditSink};
use merit_core::config::WorkflowConfig;
use merit_core::domain::award::AwardId;
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::instance::{
    InstanceId, InstanceProgress, InstanceStatus, InstanceView, LevelApproval, LevelApprovalId,
    LevelApprovalStatus, OverdueLevel, PendingApproval, WorkflowInstance,
};
use merit_core::domain::role::{Role, RoleCode};
use merit_core::errors::{ApplicationError, WorkflowError};
use merit_core::flows::{FlowAction, InstanceFlow, LevelEvent, TransitionOutcome};
use merit_core::notify::Notifier;
use merit_core::org::OrgDirectory;
use merit_db::repositories::{AwardRepository, CreateOutcome, InstanceRepository};

use crate::context::RequestContext;
use crate::directory::ApproverDirectory;
use crate::messages;
use crate::registry::WorkflowRegistry;

/// Engine knobs taken from the `[workflow]` configuration section.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub reject_comment_min_chars: usize,
    pub admin_role: RoleCode,
    pub notification_link_base: String,
}

impl From<&WorkflowConfig> for EngineSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            reject_comment_min_chars: config.reject_comment_min_chars,
            admin_role: config.admin_role.clone(),
            notification_link_base: config.notification_link_base.clone(),
        }
    }
}

/// Collaborators of the engine besides the registry and directory services.
pub struct EnginePorts {
    pub instances: Arc<dyn InstanceRepository>,
    pub awards: Arc<dyn AwardRepository>,
    pub org: Arc<dyn OrgDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}

/// Runs award approvals level by level. Every decision is a conditional write against the
/// instance's current level; notifications go out only after that write committed.
pub struct WorkflowEngine {
    registry: Arc<WorkflowRegistry>,
    directory: Arc<ApproverDirectory>,
    instances: Arc<dyn InstanceRepository>,
    awards: Arc<dyn AwardRepository>,
    org: Arc<dyn OrgDirectory>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    flow: InstanceFlow,
    admin_role: RoleCode,
    link_base: String,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        directory: Arc<ApproverDirectory>,
        ports: EnginePorts,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            directory,
            instances: ports.instances,
            awards: ports.awards,
            org: ports.org,
            notifier: ports.notifier,
            audit: ports.audit,
            flow: InstanceFlow::new(settings.reject_comment_min_chars),
            admin_role: settings.admin_role,
            link_base: settings.notification_link_base,
        }
    }

    /// Opens the approval chain for an award. Every level's approver is resolved against one
    /// directory snapshot before anything is written; an unresolvable level fails the call.
    pub async fn start(
        &self,
        award_id: &AwardId,
        context: &RequestContext,
    ) -> Result<InstanceView, ApplicationError> {
        let now = Utc::now();
        let award = self
            .awards
            .find_by_id(award_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("award", award_id))?;

        if let Some(existing) = self.instances.find_by_award(award_id).await? {
            let error = WorkflowError::AlreadySubmitted {
                award_id: award_id.clone(),
                instance_id: existing.instance.id,
            };
            self.refuse_start(context, award_id, &error);
            return Err(error.into());
        }

        let definition = match self.registry.find_applicable(&award.department_id, award.amount, now).await {
            Ok(definition) => definition,
            Err(error) => {
                if let Some(workflow_error) = error.workflow() {
                    self.refuse_start(context, award_id, workflow_error);
                }
                return Err(error);
            }
        };

        let manager_id = self
            .org
            .find_employee(&award.subject_id)
            .await?
            .and_then(|subject| subject.manager_id);
        let roles: HashMap<RoleCode, Role> = self
            .directory
            .list_roles()
            .await?
            .into_iter()
            .map(|role| (role.code.clone(), role))
            .collect();
        let level_roles: Vec<RoleCode> =
            definition.levels.iter().map(|level| level.approver_role.clone()).collect();
        let snapshot = self.directory.snapshot(&level_roles, manager_id.as_slice()).await?;

        let instance_id = InstanceId(format!("wfi-{}", uuid::Uuid::new_v4()));
        let mut records = Vec::with_capacity(definition.levels.len());
        for level in &definition.levels {
            let approver_id = roles
                .get(&level.approver_role)
                .and_then(|role| snapshot.resolve(role, manager_id.as_ref(), now));
            let Some(approver_id) = approver_id else {
                let error = WorkflowError::UnresolvedApprover {
                    level: level.level_order,
                    role: level.approver_role.clone(),
                };
                self.refuse_start(context, award_id, &error);
                return Err(error.into());
            };

            records.push(LevelApproval {
                id: LevelApprovalId(format!("lva-{}", uuid::Uuid::new_v4())),
                instance_id: instance_id.clone(),
                level_order: level.level_order,
                approver_role: level.approver_role.clone(),
                approver_id,
                requires_comment: level.requires_comment,
                requires_evidence: level.requires_evidence,
                timeout_days: level.timeout_days,
                status: LevelApprovalStatus::Pending,
                comments: None,
                evidence_reference: None,
                activated_at: (level.level_order == 1).then_some(now),
                decided_at: None,
            });
        }

        let instance = WorkflowInstance {
            id: instance_id.clone(),
            award_id: award.id.clone(),
            definition_id: definition.id.clone(),
            definition_name: definition.name.clone(),
            subject_id: award.subject_id.clone(),
            department_id: award.department_id.clone(),
            amount: award.amount,
            currency: award.currency.clone(),
            current_level: 1,
            level_count: definition.level_count(),
            status: InstanceStatus::InProgress,
            cancellation: None,
            started_at: now,
            completed_at: None,
        };

        match self.instances.create(&instance, &records).await? {
            CreateOutcome::Created => {}
            CreateOutcome::AlreadySubmitted(existing) => {
                let error = WorkflowError::AlreadySubmitted {
                    award_id: award_id.clone(),
                    instance_id: existing,
                };
                self.refuse_start(context, award_id, &error);
                return Err(error.into());
            }
            CreateOutcome::DefinitionUnavailable => {
                let error = WorkflowError::NoApplicableWorkflow {
                    department_id: award.department_id.clone(),
                    amount: award.amount,
                };
                self.refuse_start(context, award_id, &error);
                return Err(error.into());
            }
        }

        self.audit.emit(
            context
                .audit(Some(instance_id.clone()))
                .event("workflow.instance.started", AuditCategory::Workflow, AuditOutcome::Success)
                .with_metadata("award_id", award_id.0.clone())
                .with_metadata("definition_id", definition.id.0.clone())
                .with_metadata("level_count", definition.level_count().to_string()),
        );
        info!(
            event_name = "workflow.instance.started",
            correlation_id = %context.correlation_id,
            instance_id = %instance_id,
            award_id = %award_id,
            definition_id = %definition.id,
            level_count = definition.level_count(),
            "approval workflow started"
        );

        let view = InstanceView { instance, levels: records };
        let actions = self.flow.opening_actions(&view.levels);
        self.dispatch(&view.instance, &actions, context).await;
        Ok(view)
    }

    pub async fn approve(
        &self,
        instance_id: &InstanceId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        evidence_reference: Option<String>,
        context: &RequestContext,
    ) -> Result<InstanceView, ApplicationError> {
        let view = self.get(instance_id).await?;
        self.decide(view, approver_id, LevelEvent::Approve { comments, evidence_reference }, context)
            .await
    }

    /// Rejection at any level closes the whole chain.
    pub async fn reject(
        &self,
        instance_id: &InstanceId,
        approver_id: &EmployeeId,
        comments: Option<String>,
        context: &RequestContext,
    ) -> Result<InstanceView, ApplicationError> {
        let view = self.get(instance_id).await?;
        self.decide(view, approver_id, LevelEvent::Reject { comments }, context).await
    }

    /// Only the current holder of the configured admin role may cancel.
    pub async fn cancel(
        &self,
        instance_id: &InstanceId,
        actor_id: &EmployeeId,
        reason: Option<String>,
        context: &RequestContext,
    ) -> Result<InstanceView, ApplicationError> {
        let view = self.get(instance_id).await?;

        let admin = match self.directory.resolve(&self.admin_role, Utc::now()).await {
            Ok(holder) => Some(holder),
            Err(error) if error.workflow().is_some() => None,
            Err(error) => return Err(error),
        };
        if admin.as_ref() != Some(actor_id) {
            let error = WorkflowError::NotAuthorized {
                instance_id: instance_id.clone(),
                actor_id: actor_id.clone(),
            };
            self.refuse_decision(context, &view, "cancel", &error);
            return Err(error.into());
        }

        self.decide(view, actor_id, LevelEvent::Cancel { reason }, context).await
    }

    pub async fn get(&self, instance_id: &InstanceId) -> Result<InstanceView, ApplicationError> {
        self.instances
            .find_by_id(instance_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("workflow instance", instance_id).into())
    }

    pub async fn find_by_award(&self, award_id: &AwardId) -> Result<InstanceView, ApplicationError> {
        self.instances
            .find_by_award(award_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("workflow instance for award", award_id).into())
    }

    /// Records awaiting this approver at their instance's current level, oldest instance first.
    pub async fn list_pending_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<PendingApproval>, ApplicationError> {
        Ok(self.instances.list_pending_for(approver_id).await?)
    }

    /// Feed for the external timeout sweep; the engine never acts on it by itself.
    pub async fn list_overdue(&self, at: DateTime<Utc>) -> Result<Vec<OverdueLevel>, ApplicationError> {
        Ok(self.instances.list_overdue(at).await?)
    }

    async fn decide(
        &self,
        view: InstanceView,
        actor_id: &EmployeeId,
        event: LevelEvent,
        context: &RequestContext,
    ) -> Result<InstanceView, ApplicationError> {
        let instance_id = view.instance.id.clone();
        let audit = context.audit(Some(instance_id.clone()));

        let outcome = self
            .flow
            .apply_with_audit(&view, actor_id, &event, Utc::now(), self.audit.as_ref(), &audit)
            .map_err(|error| {
                warn!(
                    event_name = "workflow.decision.refused",
                    correlation_id = %context.correlation_id,
                    instance_id = %instance_id,
                    actor_id = %actor_id,
                    event = event.as_str(),
                    code = error.code(),
                    "decision refused"
                );
                error
            })?;

        if !self.instances.apply_transition(&outcome.transition).await? {
            let error = WorkflowError::NotCurrentLevel {
                instance_id: instance_id.clone(),
                actor_id: actor_id.clone(),
            };
            self.refuse_decision(context, &view, event.as_str(), &error);
            return Err(error.into());
        }

        let event_type = committed_event_type(&outcome);
        self.audit.emit(
            audit
                .event(event_type, AuditCategory::Workflow, AuditOutcome::Success)
                .with_metadata("from_level", outcome.from_level.to_string())
                .with_metadata("to_level", outcome.to_level.to_string())
                .with_metadata("status", outcome.to.as_str()),
        );
        info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            instance_id = %instance_id,
            actor_id = %actor_id,
            from_level = outcome.from_level,
            to_level = outcome.to_level,
            status = outcome.to.as_str(),
            "workflow decision committed"
        );

        let mut committed = view;
        committed.apply(&outcome.transition);
        self.dispatch(&committed.instance, &outcome.actions, context).await;
        Ok(committed)
    }

    /// Delivery failures are logged and audited; the committed state stays as it is.
    async fn dispatch(
        &self,
        instance: &WorkflowInstance,
        actions: &[FlowAction],
        context: &RequestContext,
    ) {
        if actions.is_empty() {
            return;
        }

        let subject_name = match self.org.find_employee(&instance.subject_id).await {
            Ok(Some(subject)) => subject.name,
            Ok(None) => instance.subject_id.0.clone(),
            Err(error) => {
                warn!(
                    event_name = "workflow.notification.subject_lookup_failed",
                    correlation_id = %context.correlation_id,
                    instance_id = %instance.id,
                    subject_id = %instance.subject_id,
                    error = %error,
                    "subject lookup failed, naming the subject by id"
                );
                instance.subject_id.0.clone()
            }
        };

        for action in actions {
            let request =
                messages::render(action, instance, &subject_name, &self.link_base, Utc::now());
            match self.notifier.notify(&request).await {
                Ok(()) => info!(
                    event_name = "workflow.notification.dispatched",
                    correlation_id = %context.correlation_id,
                    instance_id = %instance.id,
                    recipient_id = %request.recipient_id,
                    kind = request.kind.as_str(),
                    "notification dispatched"
                ),
                Err(error) => {
                    warn!(
                        event_name = "workflow.notification.failed",
                        correlation_id = %context.correlation_id,
                        instance_id = %instance.id,
                        recipient_id = %request.recipient_id,
                        kind = request.kind.as_str(),
                        error = %error,
                        "notification dispatch failed"
                    );
                    self.audit.emit(
                        context
                            .audit(Some(instance.id.clone()))
                            .event(
                                "notification.dispatch_failed",
                                AuditCategory::Notification,
                                AuditOutcome::Failed,
                            )
                            .with_metadata("recipient_id", request.recipient_id.0.clone())
                            .with_metadata("kind", request.kind.as_str())
                            .with_metadata("error", error.to_string()),
                    );
                }
            }
        }
    }

    fn refuse_start(&self, context: &RequestContext, award_id: &AwardId, error: &WorkflowError) {
        warn!(
            event_name = "workflow.instance.start_refused",
            correlation_id = %context.correlation_id,
            award_id = %award_id,
            code = error.code(),
            error = %error,
            "award not submitted"
        );
        self.audit.emit(
            context
                .audit(None)
                .event("workflow.start.refused", AuditCategory::Workflow, AuditOutcome::Rejected)
                .with_metadata("award_id", award_id.0.clone())
                .with_metadata("code", error.code()),
        );
    }

    fn refuse_decision(
        &self,
        context: &RequestContext,
        view: &InstanceView,
        event: &str,
        error: &WorkflowError,
    ) {
        warn!(
            event_name = "workflow.decision.refused",
            correlation_id = %context.correlation_id,
            instance_id = %view.instance.id,
            event,
            code = error.code(),
            "decision refused"
        );
        self.audit.emit(
            context
                .audit(Some(view.instance.id.clone()))
                .event(format!("workflow.{event}.refused"), AuditCategory::Workflow, AuditOutcome::Rejected)
                .with_metadata("code", error.code())
                .with_metadata("current_level", view.instance.current_level.to_string()),
        );
    }
}

fn committed_event_type(outcome: &TransitionOutcome) -> &'static str {
    match (&outcome.event, outcome.transition.progress) {
        (LevelEvent::Approve { .. }, InstanceProgress::Advance { .. }) => "workflow.level.approved",
        (LevelEvent::Approve { .. }, InstanceProgress::Close(_)) => "workflow.instance.approved",
        (LevelEvent::Reject { .. }, _) => "workflow.instance.rejected",
        (LevelEvent::Cancel { .. }, _) => "workflow.instance.cancelled",
    }
}
