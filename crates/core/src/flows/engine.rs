use chrono::{DateTime, Utc};

use crate::approvals::meets_minimum;
use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::employee::EmployeeId;
use crate::domain::instance::{
    Cancellation, InstanceProgress, InstanceStatus, InstanceTransition, InstanceView,
    LevelApproval, LevelApprovalStatus, RecordDecision,
};
use crate::errors::WorkflowError;
use crate::flows::states::{FlowAction, LevelEvent, TransitionOutcome};

/// The level-by-level state machine of a workflow instance.
///
/// `apply` only plans: it checks authorization and requirements against a loaded view and
/// returns the conditional transition plus the notifications to send after it commits.
#[derive(Clone, Debug)]
pub struct InstanceFlow {
    reject_comment_min_chars: usize,
}

impl InstanceFlow {
    pub fn new(reject_comment_min_chars: usize) -> Self {
        Self { reject_comment_min_chars }
    }

    pub fn reject_comment_min_chars(&self) -> usize {
        self.reject_comment_min_chars
    }

    /// Notifications owed when an instance opens: only the level 1 approver hears about it.
    pub fn opening_actions(&self, levels: &[LevelApproval]) -> Vec<FlowAction> {
        levels
            .iter()
            .find(|record| record.level_order == 1)
            .map(|record| FlowAction::NotifyApprover {
                level_order: record.level_order,
                approver_id: record.approver_id.clone(),
            })
            .into_iter()
            .collect()
    }

    /// Cancellation authority (the admin role) is checked by the caller before this runs.
    pub fn apply(
        &self,
        view: &InstanceView,
        actor_id: &EmployeeId,
        event: &LevelEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        match event {
            LevelEvent::Cancel { reason } => self.cancel(view, actor_id, reason.as_deref(), event, now),
            LevelEvent::Approve { comments, evidence_reference } => {
                let active = authorize(view, actor_id)?;
                let comments = normalized(comments.as_deref());
                let evidence_reference = normalized(evidence_reference.as_deref());

                if active.requires_comment && !meets_minimum(comments.as_deref(), 1) {
                    return Err(WorkflowError::MissingComment { level: active.level_order, min_chars: 1 });
                }
                if active.requires_evidence && evidence_reference.is_none() {
                    return Err(WorkflowError::MissingEvidence { level: active.level_order });
                }

                let instance = &view.instance;
                let decided_record = Some(RecordDecision {
                    record_id: active.id.clone(),
                    status: LevelApprovalStatus::Approved,
                    comments,
                    evidence_reference,
                });

                let (progress, to, to_level, actions) = if active.level_order >= instance.level_count {
                    (
                        InstanceProgress::Close(InstanceStatus::Approved),
                        InstanceStatus::Approved,
                        active.level_order,
                        vec![FlowAction::NotifySubjectApproved { subject_id: instance.subject_id.clone() }],
                    )
                } else {
                    let next_level = active.level_order + 1;
                    let next = view.level(next_level).ok_or_else(|| {
                        WorkflowError::not_found("level approval record", format!("{}#{next_level}", instance.id))
                    })?;
                    (
                        InstanceProgress::Advance { to_level: next_level },
                        InstanceStatus::InProgress,
                        next_level,
                        vec![FlowAction::NotifyApprover {
                            level_order: next_level,
                            approver_id: next.approver_id.clone(),
                        }],
                    )
                };

                Ok(TransitionOutcome {
                    from: instance.status,
                    to,
                    from_level: active.level_order,
                    to_level,
                    event: event.clone(),
                    transition: InstanceTransition {
                        instance_id: instance.id.clone(),
                        expected_level: active.level_order,
                        decided_record,
                        progress,
                        cancellation: None,
                        occurred_at: now,
                    },
                    actions,
                })
            }
            LevelEvent::Reject { comments } => {
                let active = authorize(view, actor_id)?;
                let comments = normalized(comments.as_deref());
                if !meets_minimum(comments.as_deref(), self.reject_comment_min_chars) {
                    return Err(WorkflowError::MissingComment {
                        level: active.level_order,
                        min_chars: self.reject_comment_min_chars,
                    });
                }
                let comment = comments.clone().unwrap_or_default();
                let instance = &view.instance;

                Ok(TransitionOutcome {
                    from: instance.status,
                    to: InstanceStatus::Rejected,
                    from_level: active.level_order,
                    to_level: active.level_order,
                    event: event.clone(),
                    transition: InstanceTransition {
                        instance_id: instance.id.clone(),
                        expected_level: active.level_order,
                        decided_record: Some(RecordDecision {
                            record_id: active.id.clone(),
                            status: LevelApprovalStatus::Rejected,
                            comments,
                            evidence_reference: None,
                        }),
                        progress: InstanceProgress::Close(InstanceStatus::Rejected),
                        cancellation: None,
                        occurred_at: now,
                    },
                    actions: vec![FlowAction::NotifySubjectRejected {
                        subject_id: instance.subject_id.clone(),
                        level_order: active.level_order,
                        comment,
                    }],
                })
            }
        }
    }

    pub fn apply_with_audit<S>(
        &self,
        view: &InstanceView,
        actor_id: &EmployeeId,
        event: &LevelEvent,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(view, actor_id, event, now);
        if let Err(error) = &result {
            sink.emit(
                audit
                    .event(
                        format!("workflow.{}.refused", event.as_str()),
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("code", error.code())
                    .with_metadata("current_level", view.instance.current_level.to_string())
                    .with_metadata("error", error.to_string()),
            );
        }
        result
    }

    fn cancel(
        &self,
        view: &InstanceView,
        actor_id: &EmployeeId,
        reason: Option<&str>,
        event: &LevelEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let instance = &view.instance;
        let Some(active) = view.active_level() else {
            return Err(WorkflowError::NotCurrentLevel {
                instance_id: instance.id.clone(),
                actor_id: actor_id.clone(),
            });
        };

        let reason = normalized(reason);
        if !meets_minimum(reason.as_deref(), self.reject_comment_min_chars) {
            return Err(WorkflowError::MissingComment {
                level: active.level_order,
                min_chars: self.reject_comment_min_chars,
            });
        }
        let reason = reason.unwrap_or_default();

        let mut actions = vec![FlowAction::NotifyCancelled {
            recipient_id: instance.subject_id.clone(),
            reason: reason.clone(),
        }];
        if active.approver_id != instance.subject_id {
            actions.push(FlowAction::NotifyCancelled {
                recipient_id: active.approver_id.clone(),
                reason: reason.clone(),
            });
        }

        Ok(TransitionOutcome {
            from: instance.status,
            to: InstanceStatus::Cancelled,
            from_level: active.level_order,
            to_level: active.level_order,
            event: event.clone(),
            transition: InstanceTransition {
                instance_id: instance.id.clone(),
                expected_level: active.level_order,
                decided_record: None,
                progress: InstanceProgress::Close(InstanceStatus::Cancelled),
                cancellation: Some(Cancellation { cancelled_by: actor_id.clone(), reason }),
                occurred_at: now,
            },
            actions,
        })
    }
}

/// `NotCurrentLevel` when the instance is closed or the actor's record is not the active one;
/// `NotAuthorized` when the actor holds no record of this instance at all.
fn authorize<'a>(view: &'a InstanceView, actor_id: &EmployeeId) -> Result<&'a LevelApproval, WorkflowError> {
    let not_current = || WorkflowError::NotCurrentLevel {
        instance_id: view.instance.id.clone(),
        actor_id: actor_id.clone(),
    };

    let Some(active) = view.active_level() else {
        return Err(not_current());
    };

    if &active.approver_id != actor_id {
        if view.levels.iter().any(|record| &record.approver_id == actor_id) {
            return Err(not_current());
        }
        return Err(WorkflowError::NotAuthorized {
            instance_id: view.instance.id.clone(),
            actor_id: actor_id.clone(),
        });
    }

    if active.status != LevelApprovalStatus::Pending {
        return Err(not_current());
    }

    Ok(active)
}

fn normalized(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|text| !text.is_empty()).map(str::to_owned)
}
