//! ============================================================================
//! Permissions - Closed vocabulary of namespaced capabilities
//! ============================================================================
//! A permission is a `domain:action` identifier. Permissions are orthogonal
//! to tiers: holding a high tier implies nothing about permissions.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::PermissionError;

/// Every permission the system knows about.
/// Adding a permission means adding it here.
pub const PERMISSION_CATALOG: [&str; 8] = [
    "admin:manage-roles",
    "admin:manage-permissions",
    "admin:view-dashboard",
    "admin:view-audit",
    "tools:execute",
    "tools:configure",
    "intel:read",
    "intel:export",
];

/// A validated permission identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Edit role definitions (create, rename, grant, revoke)
    pub const MANAGE_ROLES: Permission = Permission(Cow::Borrowed("admin:manage-roles"));
    /// Assign and unassign roles to identities
    pub const MANAGE_PERMISSIONS: Permission =
        Permission(Cow::Borrowed("admin:manage-permissions"));
    pub const VIEW_DASHBOARD: Permission = Permission(Cow::Borrowed("admin:view-dashboard"));
    pub const VIEW_AUDIT: Permission = Permission(Cow::Borrowed("admin:view-audit"));

    /// Parse and validate against the catalog
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let (domain, action) = raw
            .split_once(':')
            .ok_or_else(|| PermissionError::Malformed(raw.to_string()))?;
        if !is_kebab(domain) || !is_kebab(action) {
            return Err(PermissionError::Malformed(raw.to_string()));
        }

        PERMISSION_CATALOG
            .iter()
            .find(|known| **known == raw)
            .map(|known| Permission(Cow::Borrowed(*known)))
            .ok_or_else(|| PermissionError::Unknown(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain(&self) -> &str {
        self.0.split_once(':').map(|(d, _)| d).unwrap_or(&self.0)
    }

    pub fn action(&self) -> &str {
        self.0.split_once(':').map(|(_, a)| a).unwrap_or("")
    }

    /// True for the permissions that gate administration
    pub fn is_admin(&self) -> bool {
        *self == Permission::MANAGE_ROLES || *self == Permission::MANAGE_PERMISSIONS
    }

    /// The whole catalog as validated permissions
    pub fn all() -> impl Iterator<Item = Permission> {
        PERMISSION_CATALOG
            .iter()
            .map(|known| Permission(Cow::Borrowed(*known)))
    }
}

/// Lowercase ASCII words joined by single hyphens
pub(crate) fn is_kebab(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::parse(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Permission::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.0.into_owned()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
