use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::award::AwardId;
use crate::domain::employee::{DepartmentId, EmployeeId};
use crate::domain::role::RoleCode;
use crate::domain::workflow::WorkflowDefinitionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelApprovalId(pub String);

impl fmt::Display for LevelApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl LevelApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled_by: EmployeeId,
    pub reason: String,
}

/// One execution of a workflow definition against one award. Definition name and award
/// fields are snapshots taken at start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: InstanceId,
    pub award_id: AwardId,
    pub definition_id: WorkflowDefinitionId,
    pub definition_name: String,
    pub subject_id: EmployeeId,
    pub department_id: DepartmentId,
    pub amount: Decimal,
    pub currency: String,
    pub current_level: u32,
    pub level_count: u32,
    pub status: InstanceStatus,
    pub cancellation: Option<Cancellation>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-level approval record, bound at start to the approver resolved at that moment.
/// Carries a snapshot of the level's procedural requirements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelApproval {
    pub id: LevelApprovalId,
    pub instance_id: InstanceId,
    pub level_order: u32,
    pub approver_role: RoleCode,
    pub approver_id: EmployeeId,
    pub requires_comment: bool,
    pub requires_evidence: bool,
    pub timeout_days: u32,
    pub status: LevelApprovalStatus,
    pub comments: Option<String>,
    pub evidence_reference: Option<String>,
    /// Start of the level's timeout window; `None` until the level becomes current.
    pub activated_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl LevelApproval {
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at.map(|activated_at| activated_at + Duration::days(i64::from(self.timeout_days)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    pub instance: WorkflowInstance,
    pub levels: Vec<LevelApproval>,
}

impl InstanceView {
    pub fn level(&self, level_order: u32) -> Option<&LevelApproval> {
        self.levels.iter().find(|record| record.level_order == level_order)
    }

    /// The record that may transition, if the instance is still open.
    pub fn active_level(&self) -> Option<&LevelApproval> {
        if self.instance.status.is_terminal() {
            return None;
        }
        self.level(self.instance.current_level)
    }

    /// Writes an already-accepted transition into this view. Guards on level and status belong
    /// to the store that accepted it.
    pub fn apply(&mut self, transition: &InstanceTransition) {
        let at = transition.occurred_at;
        if let Some(decision) = &transition.decided_record {
            if let Some(record) = self.levels.iter_mut().find(|record| record.id == decision.record_id) {
                record.status = decision.status;
                record.comments = decision.comments.clone();
                record.evidence_reference = decision.evidence_reference.clone();
                record.decided_at = Some(at);
            }
        }

        match transition.progress {
            InstanceProgress::Advance { to_level } => {
                self.instance.current_level = to_level;
                if let Some(next) = self
                    .levels
                    .iter_mut()
                    .find(|record| record.level_order == to_level)
                    .filter(|record| record.status == LevelApprovalStatus::Pending)
                {
                    next.activated_at = Some(at);
                }
            }
            InstanceProgress::Close(status) => {
                self.instance.status = status;
                self.instance.completed_at = Some(at);
                self.instance.cancellation = transition.cancellation.clone();
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub instance_id: InstanceId,
    pub award_id: AwardId,
    pub record_id: LevelApprovalId,
    pub definition_name: String,
    pub subject_id: EmployeeId,
    pub amount: Decimal,
    pub currency: String,
    pub level_order: u32,
    pub approver_role: RoleCode,
    pub requires_comment: bool,
    pub requires_evidence: bool,
    pub timeout_days: u32,
    pub started_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueLevel {
    pub instance_id: InstanceId,
    pub award_id: AwardId,
    pub record_id: LevelApprovalId,
    pub level_order: u32,
    pub approver_role: RoleCode,
    pub approver_id: EmployeeId,
    pub activated_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecision {
    pub record_id: LevelApprovalId,
    pub status: LevelApprovalStatus,
    pub comments: Option<String>,
    pub evidence_reference: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceProgress {
    Advance { to_level: u32 },
    Close(InstanceStatus),
}

/// A conditional state change: applies only while the instance is in progress at
/// `expected_level` and the decided record is still pending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTransition {
    pub instance_id: InstanceId,
    pub expected_level: u32,
    pub decided_record: Option<RecordDecision>,
    pub progress: InstanceProgress,
    pub cancellation: Option<Cancellation>,
    pub occurred_at: DateTime<Utc>,
}
