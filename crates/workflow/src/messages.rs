use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use merit_core::domain::instance::WorkflowInstance;
use merit_core::flows::FlowAction;
use merit_core::notify::{NotificationKind, NotificationRequest};

pub fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {currency}", amount.round_dp(2))
}

pub fn award_link(link_base: &str, instance: &WorkflowInstance) -> String {
    format!("{}/{}", link_base.trim_end_matches('/'), instance.award_id)
}

/// Turns a committed flow action into the request handed to the notifier.
pub fn render(
    action: &FlowAction,
    instance: &WorkflowInstance,
    subject_name: &str,
    link_base: &str,
    now: DateTime<Utc>,
) -> NotificationRequest {
    let amount = format_amount(instance.amount, &instance.currency);

    let (recipient_id, kind, title, message) = match action {
        FlowAction::NotifyApprover { level_order, approver_id } => (
            approver_id.clone(),
            NotificationKind::ApprovalRequested,
            "Approval requested".to_owned(),
            format!("Award for {subject_name} of {amount} awaits your approval (level {level_order})."),
        ),
        FlowAction::NotifySubjectApproved { subject_id } => (
            subject_id.clone(),
            NotificationKind::AwardApproved,
            "Award approved".to_owned(),
            format!("Your award of {amount} was approved at every level of {}.", instance.definition_name),
        ),
        FlowAction::NotifySubjectRejected { subject_id, level_order, comment } => (
            subject_id.clone(),
            NotificationKind::AwardRejected,
            "Award rejected".to_owned(),
            format!("Your award of {amount} was rejected at level {level_order}: {comment}"),
        ),
        FlowAction::NotifyCancelled { recipient_id, reason } => (
            recipient_id.clone(),
            NotificationKind::WorkflowCancelled,
            "Approval cancelled".to_owned(),
            format!("The approval of the award for {subject_name} of {amount} was cancelled: {reason}"),
        ),
    };

    NotificationRequest {
        recipient_id,
        kind,
        title,
        message,
        link: award_link(link_base, instance),
        instance_id: instance.id.clone(),
        award_id: instance.award_id.clone(),
        requested_at: now,
    }
}
