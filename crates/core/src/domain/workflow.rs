use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::employee::DepartmentId;
use crate::domain::role::RoleCode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub String);

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    /// 1-based, contiguous within a definition.
    pub level_order: u32,
    pub approver_role: RoleCode,
    pub requires_comment: bool,
    pub requires_evidence: bool,
    pub timeout_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowDefinitionId,
    pub name: String,
    pub description: Option<String>,
    pub min_value: Decimal,
    pub max_value: Option<Decimal>,
    /// `None` applies to every department.
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub levels: Vec<ApprovalLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn level(&self, level_order: u32) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.level_order == level_order)
    }

    pub fn level_count(&self) -> u32 {
        u32::try_from(self.levels.len()).unwrap_or(u32::MAX)
    }

    pub fn is_department_scoped(&self) -> bool {
        self.department_id.is_some()
    }

    pub fn matches(&self, department_id: &DepartmentId, amount: Decimal) -> bool {
        if amount < self.min_value {
            return false;
        }

        if let Some(max_value) = self.max_value {
            if amount > max_value {
                return false;
            }
        }

        match &self.department_id {
            Some(scoped) => scoped == department_id,
            None => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalLevel {
    pub level_order: u32,
    pub approver_role: RoleCode,
    #[serde(default)]
    pub requires_comment: bool,
    #[serde(default)]
    pub requires_evidence: bool,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub timeout_days: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min_value: Decimal,
    #[serde(default)]
    pub max_value: Option<Decimal>,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    pub levels: Vec<NewApprovalLevel>,
}

/// Partial update. For the nullable fields, an absent key leaves the value alone and an
/// explicit `null` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub min_value: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_value: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department_id: Option<Option<DepartmentId>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub levels: Option<Vec<NewApprovalLevel>>,
}

impl DefinitionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.min_value.is_none()
            && self.max_value.is_none()
            && self.department_id.is_none()
            && self.is_active.is_none()
            && self.levels.is_none()
    }

    pub fn touches_levels(&self) -> bool {
        self.levels.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionFilter {
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl DefinitionFilter {
    pub fn accepts(&self, definition: &WorkflowDefinition) -> bool {
        if let Some(department_id) = &self.department_id {
            if definition.department_id.as_ref() != Some(department_id) {
                return false;
            }
        }

        self.is_active.map_or(true, |is_active| definition.is_active == is_active)
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
