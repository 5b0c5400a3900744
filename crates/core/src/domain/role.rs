use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleCode(pub String);

impl RoleCode {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the holder of a role is found for a given award.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleResolution {
    /// Purely through approver assignments.
    #[default]
    Assignment,
    /// The award subject's direct manager, unless that manager delegated the role.
    SubjectManager,
}

impl RoleResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::SubjectManager => "subject_manager",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assignment" => Some(Self::Assignment),
            "subject_manager" => Some(Self::SubjectManager),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub code: RoleCode,
    pub display_name: String,
    pub rank: u8,
    #[serde(default)]
    pub resolution: RoleResolution,
}
