//! ============================================================================
//! Store Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::access::Permission;

/// Role definition as stored in the roles table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRecord {
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

/// Identity -> roles row as stored in the assignments table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub identity: String,
    pub roles: BTreeSet<String>,
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub version: u64,
    pub total_roles: usize,
    pub total_identities: usize,
    pub total_audit_entries: usize,
}
