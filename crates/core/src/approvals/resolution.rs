use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::assignment::ApproverAssignment;
use crate::domain::employee::{Employee, EmployeeId};
use crate::domain::role::{Role, RoleCode, RoleResolution};

/// Picks one effective assignment: delegated beats base holder, then earliest created, then id.
///
/// `is_active` answers the Org Directory half of effectiveness for the bound employee.
pub fn select_assignment<'a, F>(
    assignments: &'a [ApproverAssignment],
    role: &RoleCode,
    at: DateTime<Utc>,
    is_active: F,
) -> Option<&'a ApproverAssignment>
where
    F: Fn(&EmployeeId) -> bool,
{
    assignments
        .iter()
        .filter(|assignment| &assignment.role == role)
        .filter(|assignment| assignment.covers(at) && is_active(&assignment.employee_id))
        .min_by(|left, right| {
            right
                .is_delegated()
                .cmp(&left.is_delegated())
                .then_with(|| left.created_at.cmp(&right.created_at))
                .then_with(|| left.id.cmp(&right.id))
        })
}

/// A point-in-time view of assignments and employee status. Every level of one start is
/// resolved against the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct ResolutionSnapshot {
    assignments: Vec<ApproverAssignment>,
    employees: HashMap<EmployeeId, Employee>,
}

impl ResolutionSnapshot {
    pub fn new(assignments: Vec<ApproverAssignment>, employees: Vec<Employee>) -> Self {
        let employees = employees.into_iter().map(|employee| (employee.id.clone(), employee)).collect();
        Self { assignments, employees }
    }

    /// Employee ids whose status this snapshot must know about.
    pub fn referenced_employees(assignments: &[ApproverAssignment]) -> Vec<EmployeeId> {
        let mut ids: Vec<EmployeeId> =
            assignments.iter().map(|assignment| assignment.employee_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn is_active(&self, employee_id: &EmployeeId) -> bool {
        self.employees.get(employee_id).is_some_and(|employee| employee.active)
    }

    pub fn employee(&self, employee_id: &EmployeeId) -> Option<&Employee> {
        self.employees.get(employee_id)
    }

    /// The effective assignment holder of `role` at `at`, with no award subject in play.
    pub fn holder(&self, role: &RoleCode, at: DateTime<Utc>) -> Option<EmployeeId> {
        select_assignment(&self.assignments, role, at, |employee_id| self.is_active(employee_id))
            .map(|assignment| assignment.employee_id.clone())
    }

    /// Resolves the approver for `role` on behalf of an award subject. For `subject_manager`
    /// roles the subject's direct manager acts unless an effective delegation of the role was
    /// made by that manager; a subject without a manager leaves the role unresolved.
    pub fn resolve(
        &self,
        role: &Role,
        subject_manager: Option<&EmployeeId>,
        at: DateTime<Utc>,
    ) -> Option<EmployeeId> {
        match (role.resolution, subject_manager) {
            (RoleResolution::SubjectManager, Some(manager_id)) => {
                let delegated = self
                    .assignments
                    .iter()
                    .filter(|assignment| assignment.role == role.code)
                    .filter(|assignment| assignment.delegated_by() == Some(manager_id))
                    .filter(|assignment| {
                        assignment.covers(at) && self.is_active(&assignment.employee_id)
                    })
                    .min_by(|left, right| {
                        left.created_at
                            .cmp(&right.created_at)
                            .then_with(|| left.id.cmp(&right.id))
                    });

                match delegated {
                    Some(assignment) => Some(assignment.employee_id.clone()),
                    None if self.is_active(manager_id) => Some(manager_id.clone()),
                    None => None,
                }
            }
            (RoleResolution::SubjectManager, None) => None,
            (RoleResolution::Assignment, _) => self.holder(&role.code, at),
        }
    }
}
