use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use merit_core::domain::assignment::{ApproverAssignment, AssignmentId};
use merit_core::domain::award::{Award, AwardId};
use merit_core::domain::employee::EmployeeId;
use merit_core::domain::instance::{
    InstanceId, InstanceTransition, InstanceView, LevelApproval,
    LevelApprovalStatus, OverdueLevel, PendingApproval, WorkflowInstance,
};
use merit_core::domain::role::{Role, RoleCode};
use merit_core::domain::workflow::{DefinitionFilter, WorkflowDefinition, WorkflowDefinitionId};

use super::{
    AssignmentRepository, AwardRepository, CreateOutcome, DeleteOutcome, InstanceRepository,
    RepositoryError, RoleRepository, UpdateOutcome, WorkflowDefinitionRepository,
};

#[derive(Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<RoleCode, Role>>,
}

#[async_trait::async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn find(&self, code: &RoleCode) -> Result<Option<Role>, RepositoryError> {
        let roles = self.roles.read().await;
        Ok(roles.get(code).cloned())
    }

    async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let roles = self.roles.read().await;
        let mut listed: Vec<Role> = roles.values().cloned().collect();
        listed.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.code.cmp(&b.code)));
        Ok(listed)
    }

    async fn save(&self, role: Role) -> Result<(), RepositoryError> {
        let mut roles = self.roles.write().await;
        roles.insert(role.code.clone(), role);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: RwLock<HashMap<AssignmentId, ApproverAssignment>>,
}

fn oldest_first(assignments: &mut [ApproverAssignment]) {
    assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait::async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<ApproverAssignment>, RepositoryError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(id).cloned())
    }

    async fn list_active_for_roles(
        &self,
        roles: &[RoleCode],
    ) -> Result<Vec<ApproverAssignment>, RepositoryError> {
        let assignments = self.assignments.read().await;
        let mut listed: Vec<ApproverAssignment> = assignments
            .values()
            .filter(|assignment| assignment.active && roles.contains(&assignment.role))
            .cloned()
            .collect();
        oldest_first(&mut listed);
        Ok(listed)
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<ApproverAssignment>, RepositoryError> {
        let assignments = self.assignments.read().await;
        let mut listed: Vec<ApproverAssignment> = assignments
            .values()
            .filter(|assignment| {
                &assignment.employee_id == employee_id
                    || assignment.delegated_by() == Some(employee_id)
            })
            .cloned()
            .collect();
        oldest_first(&mut listed);
        Ok(listed)
    }

    async fn insert(&self, assignment: ApproverAssignment) -> Result<(), RepositoryError> {
        let mut assignments = self.assignments.write().await;
        assignments.insert(assignment.id.clone(), assignment);
        Ok(())
    }

    async fn revoke(&self, id: &AssignmentId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut assignments = self.assignments.write().await;
        let Some(assignment) = assignments.get_mut(id).filter(|assignment| assignment.active) else {
            return Ok(false);
        };
        assignment.active = false;
        if assignment.ends_at.map_or(true, |ends_at| ends_at > at) {
            assignment.ends_at = Some(at);
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryAwardRepository {
    awards: RwLock<HashMap<AwardId, Award>>,
}

#[async_trait::async_trait]
impl AwardRepository for InMemoryAwardRepository {
    async fn find_by_id(&self, id: &AwardId) -> Result<Option<Award>, RepositoryError> {
        let awards = self.awards.read().await;
        Ok(awards.get(id).cloned())
    }

    async fn save(&self, award: Award) -> Result<(), RepositoryError> {
        let mut awards = self.awards.write().await;
        awards.insert(award.id.clone(), award);
        Ok(())
    }
}

#[derive(Default)]
struct WorkflowState {
    definitions: HashMap<WorkflowDefinitionId, WorkflowDefinition>,
    instances: HashMap<InstanceId, InstanceView>,
}

impl WorkflowState {
    fn in_progress_count(&self, definition_id: &WorkflowDefinitionId) -> u64 {
        let count = self
            .instances
            .values()
            .filter(|view| {
                &view.instance.definition_id == definition_id && !view.instance.status.is_terminal()
            })
            .count();
        u64::try_from(count).unwrap_or(u64::MAX)
    }

    fn active_levels(&self) -> impl Iterator<Item = (&WorkflowInstance, &LevelApproval)> {
        self.instances.values().filter_map(|view| {
            view.active_level()
                .filter(|record| record.status == LevelApprovalStatus::Pending)
                .map(|record| (&view.instance, record))
        })
    }
}

/// Definitions and instances behind one lock, so definition locking and instance
/// transitions see the same snapshot.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<WorkflowState>,
}

#[async_trait::async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowStore {
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.definitions.get(id).cloned())
    }

    async fn list(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let state = self.state.read().await;
        let mut listed: Vec<WorkflowDefinition> =
            state.definitions.values().filter(|definition| filter.accepts(definition)).cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(listed)
    }

    async fn insert(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.definitions.insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    async fn update(
        &self,
        definition: &WorkflowDefinition,
        levels_changed: bool,
    ) -> Result<UpdateOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.definitions.contains_key(&definition.id) {
            return Ok(UpdateOutcome::NotFound);
        }
        if levels_changed && state.in_progress_count(&definition.id) > 0 {
            return Ok(UpdateOutcome::Locked);
        }
        state.definitions.insert(definition.id.clone(), definition.clone());
        Ok(UpdateOutcome::Updated)
    }

    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<DeleteOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.definitions.contains_key(id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let active = state.in_progress_count(id);
        if active > 0 {
            return Ok(DeleteOutcome::HasActiveInstances(active));
        }
        state.definitions.remove(id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn references_role(&self, role: &RoleCode) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .definitions
            .values()
            .any(|definition| definition.levels.iter().any(|level| &level.approver_role == role)))
    }
}

#[async_trait::async_trait]
impl InstanceRepository for InMemoryWorkflowStore {
    async fn create(
        &self,
        instance: &WorkflowInstance,
        levels: &[LevelApproval],
    ) -> Result<CreateOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) =
            state.instances.values().find(|view| view.instance.award_id == instance.award_id)
        {
            return Ok(CreateOutcome::AlreadySubmitted(existing.instance.id.clone()));
        }
        let available = state
            .definitions
            .get(&instance.definition_id)
            .is_some_and(|definition| definition.is_active);
        if !available {
            return Ok(CreateOutcome::DefinitionUnavailable);
        }

        let mut levels = levels.to_vec();
        levels.sort_by_key(|record| record.level_order);
        state
            .instances
            .insert(instance.id.clone(), InstanceView { instance: instance.clone(), levels });
        Ok(CreateOutcome::Created)
    }

    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<InstanceView>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.instances.get(id).cloned())
    }

    async fn find_by_award(
        &self,
        award_id: &AwardId,
    ) -> Result<Option<InstanceView>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.instances.values().find(|view| &view.instance.award_id == award_id).cloned())
    }

    async fn apply_transition(
        &self,
        transition: &InstanceTransition,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(view) = state.instances.get_mut(&transition.instance_id) else {
            return Ok(false);
        };
        if view.instance.status.is_terminal()
            || view.instance.current_level != transition.expected_level
        {
            return Ok(false);
        }
        if let Some(decision) = &transition.decided_record {
            let still_pending = view.levels.iter().any(|record| {
                record.id == decision.record_id
                    && record.level_order == transition.expected_level
                    && record.status == LevelApprovalStatus::Pending
            });
            if !still_pending {
                return Ok(false);
            }
        }

        view.apply(transition);
        Ok(true)
    }

    async fn list_pending_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<PendingApproval>, RepositoryError> {
        let state = self.state.read().await;
        let mut pending: Vec<PendingApproval> = state
            .active_levels()
            .filter(|(_, record)| &record.approver_id == approver_id)
            .map(|(instance, record)| PendingApproval {
                instance_id: instance.id.clone(),
                award_id: instance.award_id.clone(),
                record_id: record.id.clone(),
                definition_name: instance.definition_name.clone(),
                subject_id: instance.subject_id.clone(),
                amount: instance.amount,
                currency: instance.currency.clone(),
                level_order: record.level_order,
                approver_role: record.approver_role.clone(),
                requires_comment: record.requires_comment,
                requires_evidence: record.requires_evidence,
                timeout_days: record.timeout_days,
                started_at: instance.started_at,
                activated_at: record.activated_at,
                due_at: record.due_at(),
            })
            .collect();
        pending.sort_by(|a, b| {
            a.started_at.cmp(&b.started_at).then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        Ok(pending)
    }

    async fn list_overdue(&self, at: DateTime<Utc>) -> Result<Vec<OverdueLevel>, RepositoryError> {
        let state = self.state.read().await;
        let mut overdue: Vec<OverdueLevel> = state
            .active_levels()
            .filter_map(|(instance, record)| {
                let activated_at = record.activated_at?;
                let due_at = activated_at + Duration::days(i64::from(record.timeout_days));
                (due_at <= at).then(|| OverdueLevel {
                    instance_id: instance.id.clone(),
                    award_id: instance.award_id.clone(),
                    record_id: record.id.clone(),
                    level_order: record.level_order,
                    approver_role: record.approver_role.clone(),
                    approver_id: record.approver_id.clone(),
                    activated_at,
                    due_at,
                })
            })
            .collect();
        overdue.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.instance_id.cmp(&b.instance_id)));
        Ok(overdue)
    }
}
