//! Shared types used across the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record operations checked by the authorization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Privilege level a single data-access call runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Caller's own access, subject to row-level restrictions
    Normal,
    /// Service access bypassing row-level restrictions
    Elevated,
}

/// Concrete access handed to the store: who is asking and at which privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Normal { user_id: Uuid },
    Elevated,
}

impl Access {
    pub fn privilege(&self) -> Privilege {
        match self {
            Access::Normal { .. } => Privilege::Normal,
            Access::Elevated => Privilege::Elevated,
        }
    }
}

/// Resolved caller: the session subject joined with its profile row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub nombre_completo: String,
    pub role: crate::resources::Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
