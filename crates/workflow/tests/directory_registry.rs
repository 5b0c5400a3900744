mod support;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use merit_core::domain::assignment::AssignmentId;
use merit_core::domain::employee::DepartmentId;
use merit_core::domain::role::{RoleCode, RoleResolution};
use merit_core::domain::workflow::{DefinitionFilter, DefinitionPatch};
use merit_workflow::{AssignmentRequest, DelegationRequest, RoleSpec};

use support::{code_of, ctx, definition, id, Harness, ADMIN, FINANCE, FINANCE_DEPUTY, MANAGER, OUTSIDER};

#[tokio::test]
async fn delegation_wins_inside_its_window_only() {
    let harness = Harness::new().await;
    let directory = &harness.services.directory;
    let finance = RoleCode::new("finance_officer");

    directory
        .delegate(
            DelegationRequest {
                role: finance.clone(),
                from_employee_id: id(FINANCE),
                to_employee_id: id(FINANCE_DEPUTY),
                starts_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                ends_at: Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()),
                reason: "Parental leave".to_owned(),
            },
            &ctx(ADMIN),
        )
        .await
        .expect("delegation");

    // The harness base assignment starts thirty days ago, so pin a long-running one for 2025.
    directory
        .assign(
            AssignmentRequest {
                role: finance.clone(),
                employee_id: id(FINANCE),
                starts_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                ends_at: None,
            },
            &ctx(ADMIN),
        )
        .await
        .expect("base assignment");

    let mid_january = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let march = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(directory.resolve(&finance, mid_january).await.expect("resolve"), id(FINANCE_DEPUTY));
    assert_eq!(directory.resolve(&finance, mid_january).await.expect("resolve"), id(FINANCE_DEPUTY));
    assert_eq!(directory.resolve(&finance, march).await.expect("resolve"), id(FINANCE));

    let before_any = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    assert_eq!(code_of(directory.resolve(&finance, before_any).await), "not_found");

    let trail = directory.list_assignments(&id(FINANCE)).await.expect("assignments");
    assert!(trail.iter().any(|assignment| assignment.delegated_by() == Some(&id(FINANCE))));
}

#[tokio::test]
async fn inactive_employees_cannot_receive_roles() {
    let harness = Harness::new().await;
    harness.org.set_active(&id(OUTSIDER), false).await;
    let directory = &harness.services.directory;

    let assign = directory
        .assign(
            AssignmentRequest {
                role: RoleCode::new("director"),
                employee_id: id(OUTSIDER),
                starts_at: Utc::now(),
                ends_at: None,
            },
            &ctx(ADMIN),
        )
        .await;
    assert_eq!(code_of(assign), "invalid_target");

    let delegate = directory
        .delegate(
            DelegationRequest {
                role: RoleCode::new("director"),
                from_employee_id: id(MANAGER),
                to_employee_id: id("emp-ghost"),
                starts_at: Utc::now(),
                ends_at: None,
                reason: "Cover".to_owned(),
            },
            &ctx(ADMIN),
        )
        .await;
    assert_eq!(code_of(delegate), "invalid_target");

    let unknown_role = directory
        .assign(
            AssignmentRequest {
                role: RoleCode::new("treasurer"),
                employee_id: id(FINANCE),
                starts_at: Utc::now(),
                ends_at: None,
            },
            &ctx(ADMIN),
        )
        .await;
    assert_eq!(code_of(unknown_role), "not_found");
    assert_eq!(harness.audit.events_of_type("directory.assignment.refused").len(), 2);
}

#[tokio::test]
async fn empty_assignment_windows_are_refused() {
    let harness = Harness::new().await;
    let starts_at = Utc::now();
    let result = harness
        .services
        .directory
        .assign(
            AssignmentRequest {
                role: RoleCode::new("director"),
                employee_id: id(FINANCE),
                starts_at,
                ends_at: Some(starts_at),
            },
            &ctx(ADMIN),
        )
        .await;
    assert_eq!(code_of(result), "invalid_definition");
}

#[tokio::test]
async fn revoking_is_idempotent_and_ends_resolution() {
    let harness = Harness::new().await;
    let directory = &harness.services.directory;
    let director = RoleCode::new("director");
    let assignment_id = directory
        .list_assignments(&id(support::DIRECTOR))
        .await
        .expect("assignments")
        .remove(0)
        .id;

    directory.revoke(&assignment_id, &ctx(ADMIN)).await.expect("first revoke");
    directory.revoke(&assignment_id, &ctx(ADMIN)).await.expect("second revoke");
    directory.revoke(&AssignmentId("asg-unknown".to_owned()), &ctx(ADMIN)).await.expect("unknown id");

    assert_eq!(harness.audit.events_of_type("directory.assignment.revoked").len(), 1);
    let at = Utc::now() + Duration::seconds(1);
    assert_eq!(code_of(directory.resolve(&director, at).await), "not_found");

    let trail = directory.list_assignments(&id(support::DIRECTOR)).await.expect("assignments");
    assert_eq!(trail.len(), 1, "revoked assignments stay listed");
    assert!(trail[0].ends_at.is_some());
}

#[tokio::test]
async fn roles_referenced_by_definitions_are_frozen() {
    let harness = Harness::new().await;
    let directory = &harness.services.directory;
    harness.define("Finance only", 0, None, &["finance_officer"]).await;

    let same = RoleSpec {
        code: "Finance_Officer".to_owned(),
        display_name: "Finance officer".to_owned(),
        rank: 20,
        resolution: RoleResolution::Assignment,
    };
    let unchanged = directory.define_role(same.clone(), &ctx(ADMIN)).await.expect("identical redefinition");
    assert_eq!(unchanged.code, RoleCode::new("finance_officer"));

    let renamed = RoleSpec { display_name: "Controller".to_owned(), ..same };
    assert_eq!(code_of(directory.define_role(renamed, &ctx(ADMIN)).await), "role_in_use");

    let bad = RoleSpec {
        code: "head of hr".to_owned(),
        display_name: "Head of HR".to_owned(),
        rank: 1,
        resolution: RoleResolution::Assignment,
    };
    assert_eq!(code_of(directory.define_role(bad, &ctx(ADMIN)).await), "invalid_definition");
}

#[tokio::test]
async fn definitions_are_validated_against_levels_and_roles() {
    let harness = Harness::new().await;
    let registry = &harness.services.registry;

    let empty = definition("Empty", 0, None, &[]);
    assert_eq!(code_of(registry.create(empty, &ctx(ADMIN)).await), "invalid_definition");

    let mut gap = definition("Gap", 0, None, &["direct_manager", "finance_officer"]);
    gap.levels[1].level_order = 3;
    assert_eq!(code_of(registry.create(gap, &ctx(ADMIN)).await), "invalid_definition");

    let unknown = definition("Unknown", 0, None, &["treasurer"]);
    assert_eq!(code_of(registry.create(unknown, &ctx(ADMIN)).await), "invalid_definition");

    let mut inverted = definition("Inverted", 5000, None, &["director"]);
    inverted.max_value = Some(Decimal::new(100, 0));
    assert_eq!(code_of(registry.create(inverted, &ctx(ADMIN)).await), "invalid_definition");

    let created = harness.define("Sales", 0, Some("sales"), &["direct_manager"]).await;
    assert!(created.id.0.starts_with("wfd-"));
    assert!(created.is_active);
    assert_eq!(created.levels[0].timeout_days, 3, "configured default timeout");
}

#[tokio::test]
async fn find_applicable_prefers_scope_then_highest_floor() {
    let harness = Harness::new().await;
    let registry = &harness.services.registry;
    harness.define("Global", 0, None, &["finance_officer"]).await;
    let global_large = harness.define("Global large", 1000, None, &["director"]).await;
    let sales = harness.define("Sales", 0, Some("sales"), &["direct_manager"]).await;
    let sales_large = harness.define("Sales large", 2500, Some("sales"), &["director"]).await;
    let sales_dept = DepartmentId("sales".to_owned());
    let now = Utc::now();

    let ops_dept = DepartmentId("ops".to_owned());
    let large = Decimal::new(5000, 0);
    let small = Decimal::new(1200, 0);

    assert_eq!(registry.find_applicable(&sales_dept, large, now).await.expect("match").id, sales_large.id);
    assert_eq!(registry.find_applicable(&sales_dept, small, now).await.expect("match").id, sales.id);
    assert_eq!(registry.find_applicable(&ops_dept, large, now).await.expect("match").id, global_large.id);

    registry
        .update(&sales_large.id, DefinitionPatch { is_active: Some(false), ..DefinitionPatch::default() }, &ctx(ADMIN))
        .await
        .expect("deactivate");
    let fallback = registry.find_applicable(&sales_dept, large, now).await.expect("match");
    assert_eq!(fallback.id, sales.id, "inactive definitions are skipped");

    let listed = registry
        .list(&DefinitionFilter { department_id: Some(sales_dept.clone()), is_active: None })
        .await
        .expect("list");
    assert_eq!(listed.len(), 2);
    let active = registry
        .list(&DefinitionFilter { department_id: None, is_active: Some(true) })
        .await
        .expect("list");
    assert_eq!(active.len(), 3);
}

#[tokio::test]
async fn updates_and_deletes_of_unknown_definitions_report_not_found() {
    let harness = Harness::new().await;
    let registry = &harness.services.registry;
    let missing = merit_core::domain::workflow::WorkflowDefinitionId("wfd-missing".to_owned());

    let patch = DefinitionPatch { name: Some("x".to_owned()), ..DefinitionPatch::default() };
    assert_eq!(code_of(registry.update(&missing, patch, &ctx(ADMIN)).await), "not_found");
    assert_eq!(code_of(registry.delete(&missing, &ctx(ADMIN)).await), "not_found");
}
