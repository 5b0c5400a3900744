use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::approvals::trimmed_len;
use crate::domain::role::RoleCode;
use crate::domain::workflow::{
    ApprovalLevel, DefinitionPatch, NewApprovalLevel, NewWorkflowDefinition, WorkflowDefinition,
    WorkflowDefinitionId,
};
use crate::errors::WorkflowError;

const MIN_NAME_CHARS: usize = 3;

/// What a definition is checked against besides its own shape.
#[derive(Clone, Debug)]
pub struct DefinitionRules {
    pub known_roles: HashSet<RoleCode>,
    pub default_timeout_days: u32,
}

/// Levels must be non-empty, ordered 1..N without gaps or duplicates, bound to defined roles,
/// and carry a positive timeout. Returns them sorted by `level_order`.
pub fn validate_levels(
    levels: &[NewApprovalLevel],
    rules: &DefinitionRules,
) -> Result<Vec<ApprovalLevel>, WorkflowError> {
    if levels.is_empty() {
        return Err(WorkflowError::InvalidDefinition("at least one level is required".to_owned()));
    }

    let mut sorted: Vec<&NewApprovalLevel> = levels.iter().collect();
    sorted.sort_by_key(|level| level.level_order);

    let mut validated = Vec::with_capacity(sorted.len());
    for (index, level) in sorted.into_iter().enumerate() {
        let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
        if level.level_order != expected {
            return Err(WorkflowError::InvalidDefinition(format!(
                "level orders must form the sequence 1..{}; found {} where {} was expected",
                levels.len(),
                level.level_order,
                expected
            )));
        }

        let approver_role = RoleCode::new(&level.approver_role.0);
        if !rules.known_roles.contains(&approver_role) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "level {} references undefined role `{approver_role}`",
                level.level_order
            )));
        }

        let timeout_days = level.timeout_days.unwrap_or(rules.default_timeout_days);
        if timeout_days == 0 {
            return Err(WorkflowError::InvalidDefinition(format!(
                "level {} timeout must be at least one day",
                level.level_order
            )));
        }

        validated.push(ApprovalLevel {
            level_order: level.level_order,
            approver_role,
            requires_comment: level.requires_comment,
            requires_evidence: level.requires_evidence,
            timeout_days,
        });
    }

    Ok(validated)
}

fn validate_header(
    name: &str,
    min_value: Decimal,
    max_value: Option<Decimal>,
) -> Result<(), WorkflowError> {
    if trimmed_len(name) < MIN_NAME_CHARS {
        return Err(WorkflowError::InvalidDefinition(format!(
            "name must have at least {MIN_NAME_CHARS} characters"
        )));
    }
    if min_value < Decimal::ZERO {
        return Err(WorkflowError::InvalidDefinition("min_value must not be negative".to_owned()));
    }
    if let Some(max_value) = max_value {
        if max_value < min_value {
            return Err(WorkflowError::InvalidDefinition(format!(
                "max_value {max_value} is below min_value {min_value}"
            )));
        }
    }
    Ok(())
}

pub fn build_definition(
    id: WorkflowDefinitionId,
    input: &NewWorkflowDefinition,
    rules: &DefinitionRules,
    now: DateTime<Utc>,
) -> Result<WorkflowDefinition, WorkflowError> {
    validate_header(&input.name, input.min_value, input.max_value)?;
    let levels = validate_levels(&input.levels, rules)?;

    Ok(WorkflowDefinition {
        id,
        name: input.name.trim().to_owned(),
        description: input.description.clone(),
        min_value: input.min_value,
        max_value: input.max_value,
        department_id: input.department_id.clone(),
        is_active: true,
        levels,
        created_at: now,
        updated_at: now,
    })
}

/// Produces the updated definition. Whether the level edit is allowed (no in-progress instance)
/// is decided by the store at write time.
pub fn apply_patch(
    current: &WorkflowDefinition,
    patch: &DefinitionPatch,
    rules: &DefinitionRules,
    now: DateTime<Utc>,
) -> Result<WorkflowDefinition, WorkflowError> {
    if patch.is_empty() {
        return Err(WorkflowError::InvalidDefinition("no fields to update".to_owned()));
    }

    let mut updated = current.clone();
    if let Some(name) = &patch.name {
        updated.name = name.trim().to_owned();
    }
    if let Some(description) = &patch.description {
        updated.description = description.clone();
    }
    if let Some(min_value) = patch.min_value {
        updated.min_value = min_value;
    }
    if let Some(max_value) = patch.max_value {
        updated.max_value = max_value;
    }
    if let Some(department_id) = &patch.department_id {
        updated.department_id = department_id.clone();
    }
    if let Some(is_active) = patch.is_active {
        updated.is_active = is_active;
    }
    if let Some(levels) = &patch.levels {
        updated.levels = validate_levels(levels, rules)?;
    }

    validate_header(&updated.name, updated.min_value, updated.max_value)?;
    updated.updated_at = now;
    Ok(updated)
}
