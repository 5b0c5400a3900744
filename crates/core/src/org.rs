use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::employee::{Employee, EmployeeId};
use crate::errors::ApplicationError;

/// Read-only port onto the Org/Employee Directory.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, ApplicationError>;

    /// Unknown ids are omitted from the result.
    async fn find_employees(&self, ids: &[EmployeeId]) -> Result<Vec<Employee>, ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryOrgDirectory {
    employees: Arc<RwLock<HashMap<EmployeeId, Employee>>>,
}

impl InMemoryOrgDirectory {
    pub fn with_employees(employees: impl IntoIterator<Item = Employee>) -> Self {
        let employees = employees.into_iter().map(|employee| (employee.id.clone(), employee)).collect();
        Self { employees: Arc::new(RwLock::new(employees)) }
    }

    pub async fn upsert(&self, employee: Employee) {
        self.employees.write().await.insert(employee.id.clone(), employee);
    }

    pub async fn set_active(&self, id: &EmployeeId, active: bool) {
        if let Some(employee) = self.employees.write().await.get_mut(id) {
            employee.active = active;
        }
    }
}

#[async_trait]
impl OrgDirectory for InMemoryOrgDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, ApplicationError> {
        Ok(self.employees.read().await.get(id).cloned())
    }

    async fn find_employees(&self, ids: &[EmployeeId]) -> Result<Vec<Employee>, ApplicationError> {
        let employees = self.employees.read().await;
        Ok(ids.iter().filter_map(|id| employees.get(id).cloned()).collect())
    }
}
