use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::role::RoleCode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// The employee being substituted.
    pub delegated_by: EmployeeId,
    pub reason: String,
}

/// Binds one employee to one role for the half-open interval `[starts_at, ends_at)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignment {
    pub id: AssignmentId,
    pub role: RoleCode,
    pub employee_id: EmployeeId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub delegation: Option<Delegation>,
    pub created_at: DateTime<Utc>,
}

impl ApproverAssignment {
    pub fn is_delegated(&self) -> bool {
        self.delegation.is_some()
    }

    /// Temporal and soft-delete half of effectiveness; employee status is checked by the caller.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= at && self.ends_at.map_or(true, |ends_at| at < ends_at)
    }

    pub fn delegated_by(&self) -> Option<&EmployeeId> {
        self.delegation.as_ref().map(|delegation| &delegation.delegated_by)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ApproverAssignment, AssignmentId};
    use crate::domain::{employee::EmployeeId, role::RoleCode};

    fn assignment(ends_at: Option<chrono::DateTime<Utc>>) -> ApproverAssignment {
        let starts_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        ApproverAssignment {
            id: AssignmentId("asg-1".to_string()),
            role: RoleCode::new("finance_officer"),
            employee_id: EmployeeId("emp-x".to_string()),
            starts_at,
            ends_at,
            active: true,
            delegation: None,
            created_at: starts_at,
        }
    }

    #[test]
    fn interval_is_half_open() {
        let ends_at = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let assignment = assignment(Some(ends_at));

        assert!(assignment.covers(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        assert!(assignment.covers(Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap()));
        assert!(!assignment.covers(ends_at));
        assert!(!assignment.covers(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn open_ended_assignment_covers_the_future_until_revoked() {
        let mut assignment = assignment(None);
        let far_future = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert!(assignment.covers(far_future));

        assignment.active = false;
        assert!(!assignment.covers(far_future));
    }
}
