//! ============================================================================
//! Registry Snapshot - Immutable view of roles and assignments
//! ============================================================================
//! Every administrative mutation produces a new snapshot with the version
//! bumped by one. Snapshots are never edited once published.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::access::permission::is_kebab;
use crate::access::Permission;
use crate::error::AdminError;

/// Role names are lowercase kebab identifiers
pub fn validate_role_name(name: &str) -> Result<(), AdminError> {
    if is_kebab(name) {
        Ok(())
    } else {
        Err(AdminError::InvalidRoleName(name.to_string()))
    }
}

/// Versioned role -> permissions and identity -> roles tables
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    version: u64,
    roles: BTreeMap<String, BTreeSet<Permission>>,
    assignments: BTreeMap<String, BTreeSet<String>>,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a snapshot from stored tables
    pub fn from_parts(
        version: u64,
        roles: BTreeMap<String, BTreeSet<Permission>>,
        assignments: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        Self {
            version,
            roles,
            assignments,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn roles(&self) -> &BTreeMap<String, BTreeSet<Permission>> {
        &self.roles
    }

    pub fn assignments(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.assignments
    }

    pub fn role(&self, name: &str) -> Option<&BTreeSet<Permission>> {
        self.roles.get(name)
    }

    /// Roles assigned to an identity (empty when none)
    pub fn roles_of(&self, identity_id: &str) -> impl Iterator<Item = &str> {
        self.assignments
            .get(identity_id)
            .into_iter()
            .flat_map(|roles| roles.iter().map(String::as_str))
    }

    /// Union of permissions across every role the identity holds
    pub fn effective_permissions(&self, identity_id: &str) -> BTreeSet<Permission> {
        self.roles_of(identity_id)
            .filter_map(|role| self.roles.get(role))
            .flat_map(|perms| perms.iter().cloned())
            .collect()
    }

    /// Membership test without materializing the union
    pub fn grants(&self, identity_id: &str, permission: &Permission) -> bool {
        self.roles_of(identity_id)
            .filter_map(|role| self.roles.get(role))
            .any(|perms| perms.contains(permission))
    }

    /// Identities currently holding a role
    pub fn holders_of<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.assignments
            .iter()
            .filter(move |(_, roles)| roles.contains(role))
            .map(|(id, _)| id.as_str())
    }

    // ========================================================================
    // Copy-on-write edits (crate-internal; only admin commits these)
    // ========================================================================

    pub(crate) fn bumped(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    pub(crate) fn create_role(&mut self, name: &str) -> Result<(), AdminError> {
        validate_role_name(name)?;
        if self.roles.contains_key(name) {
            return Err(AdminError::RoleExists(name.to_string()));
        }
        self.roles.insert(name.to_string(), BTreeSet::new());
        Ok(())
    }

    pub(crate) fn rename_role(&mut self, from: &str, to: &str) -> Result<(), AdminError> {
        validate_role_name(to)?;
        if self.roles.contains_key(to) {
            return Err(AdminError::RoleExists(to.to_string()));
        }
        let perms = self
            .roles
            .remove(from)
            .ok_or_else(|| AdminError::RoleNotFound(from.to_string()))?;
        self.roles.insert(to.to_string(), perms);
        for roles in self.assignments.values_mut() {
            if roles.remove(from) {
                roles.insert(to.to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn delete_role(&mut self, name: &str) -> Result<(), AdminError> {
        self.roles
            .remove(name)
            .ok_or_else(|| AdminError::RoleNotFound(name.to_string()))?;
        for roles in self.assignments.values_mut() {
            roles.remove(name);
        }
        self.assignments.retain(|_, roles| !roles.is_empty());
        Ok(())
    }

    pub(crate) fn grant(&mut self, role: &str, permission: &Permission) -> Result<(), AdminError> {
        let perms = self
            .roles
            .get_mut(role)
            .ok_or_else(|| AdminError::RoleNotFound(role.to_string()))?;
        if !perms.insert(permission.clone()) {
            return Err(AdminError::PermissionPresent {
                role: role.to_string(),
                permission: permission.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn revoke(&mut self, role: &str, permission: &Permission) -> Result<(), AdminError> {
        let perms = self
            .roles
            .get_mut(role)
            .ok_or_else(|| AdminError::RoleNotFound(role.to_string()))?;
        if !perms.remove(permission) {
            return Err(AdminError::PermissionAbsent {
                role: role.to_string(),
                permission: permission.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn assign(&mut self, identity_id: &str, role: &str) -> Result<(), AdminError> {
        if !self.roles.contains_key(role) {
            return Err(AdminError::RoleNotFound(role.to_string()));
        }
        let held = self.assignments.entry(identity_id.to_string()).or_default();
        if !held.insert(role.to_string()) {
            return Err(AdminError::AlreadyAssigned {
                identity: identity_id.to_string(),
                role: role.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn unassign(&mut self, identity_id: &str, role: &str) -> Result<(), AdminError> {
        let removed = self
            .assignments
            .get_mut(identity_id)
            .map(|held| held.remove(role))
            .unwrap_or(false);
        if !removed {
            return Err(AdminError::NotAssigned {
                identity: identity_id.to_string(),
                role: role.to_string(),
            });
        }
        self.assignments.retain(|_, roles| !roles.is_empty());
        Ok(())
    }
}
