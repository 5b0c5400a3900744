use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use merit_core::domain::award::{Award, AwardId};
use merit_core::domain::employee::{DepartmentId, Employee, EmployeeId};
use merit_core::domain::role::{RoleCode, RoleResolution};
use merit_core::domain::workflow::{DefinitionFilter, NewApprovalLevel, NewWorkflowDefinition};
use merit_core::errors::ApplicationError;
use merit_db::repositories::{AwardRepository, SqlAwardRepository, SqlOrgDirectory};
use merit_workflow::{AssignmentRequest, RequestContext, RoleSpec, WorkflowServices};

use crate::commands::{load_config, open_pool, runtime, services, CommandResult};

const EMPLOYEES: [(&str, &str, &str, Option<&str>); 5] = [
    ("emp-ana", "Ana Lima", "sales", Some("emp-mgr")),
    ("emp-mgr", "Marco Reis", "sales", Some("emp-dir")),
    ("emp-fin", "Fatima Costa", "finance", None),
    ("emp-dir", "Dora Nunes", "sales", None),
    ("emp-hr", "Helena Prado", "hr", None),
];

const ROLES: [(&str, &str, u8, RoleResolution); 4] = [
    ("direct_manager", "Direct manager", 10, RoleResolution::SubjectManager),
    ("finance_officer", "Finance officer", 20, RoleResolution::Assignment),
    ("director", "Director", 30, RoleResolution::Assignment),
    ("workflow_admin", "Workflow administrator", 90, RoleResolution::Assignment),
];

const ASSIGNMENTS: [(&str, &str); 3] =
    [("finance_officer", "emp-fin"), ("director", "emp-dir"), ("workflow_admin", "emp-hr")];

const AWARDS: [(&str, i64); 2] = [("awd-demo-001", 1_500), ("awd-demo-002", 8_000)];

/// Loads a small demo org with two workflows and two submitted awards.
/// Every step skips what already exists, so repeated runs converge on the same data.
pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let org = SqlOrgDirectory::new(pool.clone());
        for (id, name, department, manager) in EMPLOYEES {
            let employee = Employee {
                id: EmployeeId(id.to_owned()),
                name: name.to_owned(),
                department_id: Some(DepartmentId(department.to_owned())),
                manager_id: manager.map(|raw| EmployeeId(raw.to_owned())),
                active: true,
            };
            org.upsert(&employee)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        }

        let awards = SqlAwardRepository::new(pool.clone());
        for award in demo_awards() {
            awards.save(award).await.map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        }

        let seeded = seed_workflows(&services(&pool, &config))
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));
        pool.close().await;
        seeded
    });

    match result {
        Ok(instances) => {
            let lines: Vec<String> = instances
                .iter()
                .map(|(award, definition)| format!("  - {award}: {definition}"))
                .collect();
            let message = format!(
                "demo data loaded: {} employees, {} roles, 2 workflow definitions, {} awards in approval:\n{}",
                EMPLOYEES.len(),
                ROLES.len(),
                instances.len(),
                lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err(failure) => CommandResult::from_step("seed", failure),
    }
}

async fn seed_workflows(
    services: &WorkflowServices,
) -> Result<Vec<(String, String)>, ApplicationError> {
    let ctx = RequestContext::system();

    for (code, display_name, rank, resolution) in ROLES {
        let spec =
            RoleSpec { code: code.to_owned(), display_name: display_name.to_owned(), rank, resolution };
        services.directory.define_role(spec, &ctx).await?;
    }

    for (role, employee) in ASSIGNMENTS {
        let role = RoleCode::new(role);
        let employee_id = EmployeeId(employee.to_owned());
        let held = services
            .directory
            .list_assignments(&employee_id)
            .await?
            .iter()
            .any(|assignment| {
                assignment.role == role && assignment.active && assignment.delegation.is_none()
            });
        if !held {
            let request = AssignmentRequest {
                role,
                employee_id,
                starts_at: Utc::now() - Duration::days(1),
                ends_at: None,
            };
            services.directory.assign(request, &ctx).await?;
        }
    }

    let existing = services.registry.list(&DefinitionFilter::default()).await?;
    for definition in demo_definitions() {
        if existing.iter().all(|known| known.name != definition.name) {
            services.registry.create(definition, &ctx).await?;
        }
    }

    let mut instances = Vec::with_capacity(AWARDS.len());
    for award in demo_awards() {
        let view = match services.engine.find_by_award(&award.id).await {
            Ok(view) => view,
            Err(error) if error.code() == "not_found" => services.engine.start(&award.id, &ctx).await?,
            Err(error) => return Err(error),
        };
        instances.push((award.id.0, view.instance.definition_name));
    }

    Ok(instances)
}

fn demo_awards() -> Vec<Award> {
    AWARDS
        .iter()
        .map(|(id, amount)| Award {
            id: AwardId((*id).to_owned()),
            subject_id: EmployeeId("emp-ana".to_owned()),
            department_id: DepartmentId("sales".to_owned()),
            amount: Decimal::new(*amount, 0),
            currency: "BRL".to_owned(),
            reference: Some("merit-cycle-demo".to_owned()),
        })
        .collect()
}

fn demo_definitions() -> Vec<NewWorkflowDefinition> {
    let level = |order: u32, role: &str, requires_comment: bool, requires_evidence: bool| {
        NewApprovalLevel {
            level_order: order,
            approver_role: RoleCode::new(role),
            requires_comment,
            requires_evidence,
            timeout_days: None,
        }
    };

    vec![
        NewWorkflowDefinition {
            name: "Standard merit award".to_owned(),
            description: Some("Manager then finance sign-off for any department".to_owned()),
            min_value: Decimal::ZERO,
            max_value: None,
            department_id: None,
            levels: vec![
                level(1, "direct_manager", false, false),
                level(2, "finance_officer", false, false),
            ],
        },
        NewWorkflowDefinition {
            name: "Large sales award".to_owned(),
            description: Some("Sales awards from 5000 need budget evidence and a director".to_owned()),
            min_value: Decimal::new(5_000, 0),
            max_value: None,
            department_id: Some(DepartmentId("sales".to_owned())),
            levels: vec![
                level(1, "direct_manager", false, false),
                level(2, "finance_officer", false, true),
                level(3, "director", true, false),
            ],
        },
    ]
}
