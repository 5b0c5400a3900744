use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::{DepartmentId, EmployeeId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AwardId(pub String);

impl fmt::Display for AwardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A finalized compensation award as produced by the calculator. Opaque to the workflow
/// apart from the fields used for matching and notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub id: AwardId,
    pub subject_id: EmployeeId,
    pub department_id: DepartmentId,
    pub amount: Decimal,
    pub currency: String,
    pub reference: Option<String>,
}
