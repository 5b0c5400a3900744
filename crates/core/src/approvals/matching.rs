use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::employee::DepartmentId;
use crate::domain::workflow::WorkflowDefinition;

/// Most specific active definition matching the award: department-scoped before global, then
/// highest `min_value`, then earliest created, then id. Definitions created after `at` are
/// not yet applicable.
pub fn select_applicable<'a>(
    definitions: &'a [WorkflowDefinition],
    department_id: &DepartmentId,
    amount: Decimal,
    at: DateTime<Utc>,
) -> Option<&'a WorkflowDefinition> {
    definitions
        .iter()
        .filter(|definition| definition.is_active && definition.created_at <= at)
        .filter(|definition| definition.matches(department_id, amount))
        .min_by_key(|definition| {
            (
                !definition.is_department_scoped(),
                Reverse(definition.min_value),
                definition.created_at,
                definition.id.clone(),
            )
        })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::select_applicable;
    use crate::domain::employee::DepartmentId;
    use crate::domain::role::RoleCode;
    use crate::domain::workflow::{ApprovalLevel, WorkflowDefinition, WorkflowDefinitionId};

    fn definition(id: &str, department: Option<&str>, min: i64, max: Option<i64>) -> WorkflowDefinition {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        WorkflowDefinition {
            id: WorkflowDefinitionId(id.to_owned()),
            name: id.to_owned(),
            description: None,
            min_value: Decimal::from(min),
            max_value: max.map(Decimal::from),
            department_id: department.map(|id| DepartmentId(id.to_owned())),
            is_active: true,
            levels: vec![ApprovalLevel {
                level_order: 1,
                approver_role: RoleCode::new("direct_manager"),
                requires_comment: false,
                requires_evidence: false,
                timeout_days: 3,
            }],
            created_at,
            updated_at: created_at,
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn department_scoped_definition_beats_global_one() {
        let definitions = vec![
            definition("wfd-global", None, 1_000, None),
            definition("wfd-sales", Some("sales"), 0, None),
        ];

        let selected =
            select_applicable(&definitions, &DepartmentId("sales".to_owned()), Decimal::from(5_000), now());
        assert_eq!(selected.map(|definition| definition.id.0.as_str()), Some("wfd-sales"));
    }

    #[test]
    fn highest_minimum_wins_among_equally_scoped() {
        let definitions = vec![
            definition("wfd-small", None, 0, None),
            definition("wfd-large", None, 2_000, None),
            definition("wfd-capped", None, 3_000, Some(4_000)),
        ];

        let selected =
            select_applicable(&definitions, &DepartmentId("sales".to_owned()), Decimal::from(5_000), now());
        assert_eq!(selected.map(|definition| definition.id.0.as_str()), Some("wfd-large"));
    }

    #[test]
    fn inactive_and_future_definitions_are_ignored() {
        let mut inactive = definition("wfd-inactive", None, 0, None);
        inactive.is_active = false;
        let mut future = definition("wfd-future", None, 0, None);
        future.created_at = now() + Duration::days(1);

        let definitions = vec![inactive, future];
        assert!(select_applicable(&definitions, &DepartmentId("sales".to_owned()), Decimal::from(10), now())
            .is_none());
    }
}
