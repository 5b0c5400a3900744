use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::award::AwardId;
use crate::domain::employee::EmployeeId;
use crate::domain::instance::InstanceId;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequested,
    AwardApproved,
    AwardRejected,
    WorkflowCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovalRequested => "approval_requested",
            Self::AwardApproved => "award_approved",
            Self::AwardRejected => "award_rejected",
            Self::WorkflowCancelled => "workflow_cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approval_requested" => Some(Self::ApprovalRequested),
            "award_approved" => Some(Self::AwardApproved),
            "award_rejected" => Some(Self::AwardRejected),
            "workflow_cancelled" => Some(Self::WorkflowCancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient_id: EmployeeId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
    pub instance_id: InstanceId,
    pub award_id: AwardId,
    pub requested_at: DateTime<Utc>,
}

/// Delivery port. Callers dispatch only after the owning transition committed and never undo
/// state when delivery fails.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
    fail_deliveries: bool,
}

impl InMemoryNotifier {
    /// A notifier whose every delivery fails, for exercising the no-rollback path.
    pub fn failing() -> Self {
        Self { sent: Arc::default(), fail_deliveries: true }
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, recipient_id: &EmployeeId) -> Vec<NotificationRequest> {
        self.sent().into_iter().filter(|request| &request.recipient_id == recipient_id).collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), ApplicationError> {
        if self.fail_deliveries {
            return Err(ApplicationError::Integration(format!(
                "delivery to `{}` failed",
                request.recipient_id
            )));
        }

        match self.sent.lock() {
            Ok(mut sent) => sent.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{InMemoryNotifier, NotificationKind, NotificationRequest, Notifier};
    use crate::domain::{award::AwardId, employee::EmployeeId, instance::InstanceId};

    fn request(recipient: &str) -> NotificationRequest {
        NotificationRequest {
            recipient_id: EmployeeId(recipient.to_owned()),
            kind: NotificationKind::ApprovalRequested,
            title: "Approval requested".to_owned(),
            message: "Award awaits your approval".to_owned(),
            link: "/approvals/awards/awd-1".to_owned(),
            instance_id: InstanceId("wfi-1".to_owned()),
            award_id: AwardId("awd-1".to_owned()),
            requested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_deliveries_per_recipient() {
        let notifier = InMemoryNotifier::default();
        notifier.notify(&request("emp-1")).await.expect("delivery should succeed");
        notifier.notify(&request("emp-2")).await.expect("delivery should succeed");

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent_to(&EmployeeId("emp-2".to_owned())).len(), 1);
    }

    #[tokio::test]
    async fn failing_notifier_reports_integration_error() {
        let notifier = InMemoryNotifier::failing();
        let result = notifier.notify(&request("emp-1")).await;

        assert!(result.is_err());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn kinds_parse_their_storage_encoding() {
        for kind in [
            NotificationKind::ApprovalRequested,
            NotificationKind::AwardApproved,
            NotificationKind::AwardRejected,
            NotificationKind::WorkflowCancelled,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }
}
