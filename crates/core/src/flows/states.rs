use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::instance::{InstanceStatus, InstanceTransition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LevelEvent {
    Approve { comments: Option<String>, evidence_reference: Option<String> },
    Reject { comments: Option<String> },
    Cancel { reason: Option<String> },
}

impl LevelEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Side effects the caller performs once the transition committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    NotifyApprover { level_order: u32, approver_id: EmployeeId },
    NotifySubjectApproved { subject_id: EmployeeId },
    NotifySubjectRejected { subject_id: EmployeeId, level_order: u32, comment: String },
    NotifyCancelled { recipient_id: EmployeeId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: InstanceStatus,
    pub to: InstanceStatus,
    pub from_level: u32,
    pub to_level: u32,
    pub event: LevelEvent,
    pub transition: InstanceTransition,
    pub actions: Vec<FlowAction>,
}
