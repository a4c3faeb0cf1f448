//! ============================================================================
//! Error Types - Malformed inputs and rejected administration
//! ============================================================================
//! "Not authorized" is never an error here; the evaluator returns it as a
//! plain verdict. These types cover configuration defects and rejected
//! mutations only.
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::access::Permission;

/// A tier identifier outside the fixed tier set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error(
    "Unknown tier '{identifier}'. \
     Valid tiers: UNAUTHORIZED, ENTRY_LEVEL, OPERATOR, SHADOW_ELITE, PHANTOM_COUNCIL"
)]
pub struct UnknownTierError {
    identifier: String,
}

impl UnknownTierError {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    /// The rejected identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Permission identifier errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PermissionError {
    #[error("Malformed permission '{0}': expected 'domain:action'")]
    Malformed(String),

    #[error("Unknown permission '{0}'")]
    Unknown(String),
}

/// Administration mutation errors.
/// `Forbidden` and `SelfEscalation` mean the actor lacks rights; every other
/// variant is a data error. The registry is unchanged in all cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AdminError {
    #[error("Forbidden: {actor} lacks {required}")]
    Forbidden { actor: String, required: Permission },

    #[error("Forbidden: {actor} has no resolved identity")]
    UnresolvedActor { actor: String },

    #[error("Self-escalation rejected: {actor} does not hold {permission}")]
    SelfEscalation { actor: String, permission: Permission },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role already exists: {0}")]
    RoleExists(String),

    #[error("Invalid role name '{0}': expected lowercase kebab-case")]
    InvalidRoleName(String),

    #[error("Role {role} already grants {permission}")]
    PermissionPresent { role: String, permission: Permission },

    #[error("Role {role} does not grant {permission}")]
    PermissionAbsent { role: String, permission: Permission },

    #[error("{identity} already holds role {role}")]
    AlreadyAssigned { identity: String, role: String },

    #[error("{identity} does not hold role {role}")]
    NotAssigned { identity: String, role: String },

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

impl AdminError {
    /// True when the mutation was refused for lack of rights
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AdminError::Forbidden { .. }
                | AdminError::UnresolvedActor { .. }
                | AdminError::SelfEscalation { .. }
        )
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
