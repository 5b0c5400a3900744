use async_trait::async_trait;
use tracing::info;

use merit_core::audit::{AuditEvent, AuditSink};
use merit_core::errors::ApplicationError;
use merit_core::notify::{NotificationRequest, Notifier};

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            event_name = "audit.event.recorded",
            audit_event_type = %event.event_type,
            audit_event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            instance_id = event.instance_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            actor = %event.actor,
            metadata = %metadata,
            "audit event"
        );
    }
}

/// Logs notification requests instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), ApplicationError> {
        info!(
            event_name = "notification.logged",
            recipient_id = %request.recipient_id,
            kind = request.kind.as_str(),
            instance_id = %request.instance_id,
            award_id = %request.award_id,
            link = %request.link,
            "{}",
            request.message
        );
        Ok(())
    }
}
