#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use merit_core::audit::InMemoryAuditSink;
use merit_core::config::AppConfig;
use merit_core::domain::award::{Award, AwardId};
use merit_core::domain::employee::{DepartmentId, Employee, EmployeeId};
use merit_core::domain::role::{RoleCode, RoleResolution};
use merit_core::domain::workflow::{NewApprovalLevel, NewWorkflowDefinition, WorkflowDefinition};
use merit_core::errors::ApplicationError;
use merit_core::notify::InMemoryNotifier;
use merit_core::org::InMemoryOrgDirectory;
use merit_workflow::{AssignmentRequest, RequestContext, RoleSpec, Stores, WorkflowServices};

pub const SUBJECT: &str = "emp-ana";
pub const MANAGER: &str = "emp-mgr";
pub const FINANCE: &str = "emp-fin";
pub const FINANCE_DEPUTY: &str = "emp-fin2";
pub const DIRECTOR: &str = "emp-dir";
pub const ADMIN: &str = "emp-admin";
pub const OUTSIDER: &str = "emp-out";

pub struct Harness {
    pub services: WorkflowServices,
    pub stores: Stores,
    pub org: InMemoryOrgDirectory,
    pub notifier: InMemoryNotifier,
    pub audit: InMemoryAuditSink,
}

pub fn id(raw: &str) -> EmployeeId {
    EmployeeId(raw.to_owned())
}

pub fn ctx(actor: &str) -> RequestContext {
    RequestContext::new(actor)
}

pub fn code_of<T: std::fmt::Debug>(result: Result<T, ApplicationError>) -> &'static str {
    match result {
        Ok(value) => panic!("expected a failure, got {value:?}"),
        Err(error) => error.code(),
    }
}

fn employee(raw: &str, name: &str, department: &str, manager: Option<&str>) -> Employee {
    Employee {
        id: id(raw),
        name: name.to_owned(),
        department_id: Some(DepartmentId(department.to_owned())),
        manager_id: manager.map(id),
        active: true,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_notifier(InMemoryNotifier::default()).await
    }

    pub async fn with_notifier(notifier: InMemoryNotifier) -> Self {
        Self::with_stores(notifier, |stores| stores).await
    }

    /// Org chart, the four roles and base assignments for finance, director and admin.
    /// `wrap` may swap any in-memory port for a test double before the services are built.
    pub async fn with_stores(notifier: InMemoryNotifier, wrap: impl FnOnce(Stores) -> Stores) -> Self {
        let org = InMemoryOrgDirectory::with_employees([
            employee(SUBJECT, "Ana Lima", "sales", Some(MANAGER)),
            employee(MANAGER, "Marco Reis", "sales", Some(DIRECTOR)),
            employee(FINANCE, "Fatima Costa", "finance", None),
            employee(FINANCE_DEPUTY, "Felipe Dias", "finance", None),
            employee(DIRECTOR, "Dora Nunes", "sales", None),
            employee(ADMIN, "Alex Prado", "hr", None),
            employee(OUTSIDER, "Otto Brandt", "ops", None),
        ]);
        let audit = InMemoryAuditSink::default();
        let stores = wrap(Stores::in_memory(
            Arc::new(org.clone()),
            Arc::new(notifier.clone()),
            Arc::new(audit.clone()),
        ));
        let services = WorkflowServices::new(stores.clone(), &AppConfig::default().workflow);

        let harness = Self { services, stores, org, notifier, audit };
        harness.define_role("direct_manager", "Direct manager", 10, RoleResolution::SubjectManager).await;
        harness.define_role("finance_officer", "Finance officer", 20, RoleResolution::Assignment).await;
        harness.define_role("director", "Director", 30, RoleResolution::Assignment).await;
        harness.define_role("workflow_admin", "Workflow admin", 90, RoleResolution::Assignment).await;
        harness.assign("finance_officer", FINANCE).await;
        harness.assign("director", DIRECTOR).await;
        harness.assign("workflow_admin", ADMIN).await;
        harness
    }

    pub async fn define_role(&self, code: &str, name: &str, rank: u8, resolution: RoleResolution) {
        self.services
            .directory
            .define_role(
                RoleSpec { code: code.to_owned(), display_name: name.to_owned(), rank, resolution },
                &ctx(ADMIN),
            )
            .await
            .expect("role should be defined");
    }

    pub async fn assign(&self, role: &str, employee: &str) {
        self.services
            .directory
            .assign(
                AssignmentRequest {
                    role: RoleCode::new(role),
                    employee_id: id(employee),
                    starts_at: Utc::now() - Duration::days(30),
                    ends_at: None,
                },
                &ctx(ADMIN),
            )
            .await
            .expect("assignment should be created");
    }

    pub async fn define(
        &self,
        name: &str,
        min_value: i64,
        department: Option<&str>,
        roles: &[&str],
    ) -> WorkflowDefinition {
        self.services
            .registry
            .create(definition(name, min_value, department, roles), &ctx(ADMIN))
            .await
            .expect("definition should be created")
    }

    pub async fn award(&self, raw_id: &str, amount: i64, department: &str) -> AwardId {
        self.award_for(raw_id, SUBJECT, amount, department).await
    }

    pub async fn award_for(&self, raw_id: &str, subject: &str, amount: i64, department: &str) -> AwardId {
        let award = Award {
            id: AwardId(raw_id.to_owned()),
            subject_id: id(subject),
            department_id: DepartmentId(department.to_owned()),
            amount: Decimal::new(amount, 0),
            currency: "BRL".to_owned(),
            reference: None,
        };
        self.stores.awards.save(award.clone()).await.expect("award should be stored");
        award.id
    }
}

pub fn definition(
    name: &str,
    min_value: i64,
    department: Option<&str>,
    roles: &[&str],
) -> NewWorkflowDefinition {
    NewWorkflowDefinition {
        name: name.to_owned(),
        description: None,
        min_value: Decimal::new(min_value, 0),
        max_value: None,
        department_id: department.map(|raw| DepartmentId(raw.to_owned())),
        levels: roles
            .iter()
            .enumerate()
            .map(|(index, role)| NewApprovalLevel {
                level_order: u32::try_from(index + 1).expect("level order fits"),
                approver_role: RoleCode::new(role),
                requires_comment: false,
                requires_evidence: false,
                timeout_days: None,
            })
            .collect(),
    }
}
