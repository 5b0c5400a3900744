use merit_core::audit::AuditContext;
use merit_core::domain::instance::InstanceId;

/// Who is calling and under which correlation id. Threaded through every service call so
/// logs and audit events of one request can be joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
    pub actor: String,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self { correlation_id: format!("req-{}", uuid::Uuid::new_v4()), actor: actor.into() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if !correlation_id.trim().is_empty() {
            self.correlation_id = correlation_id;
        }
        self
    }

    pub fn system() -> Self {
        Self::new("system")
    }

    pub(crate) fn audit(&self, instance_id: Option<InstanceId>) -> AuditContext {
        AuditContext::new(instance_id, self.correlation_id.clone(), self.actor.clone())
    }
}
