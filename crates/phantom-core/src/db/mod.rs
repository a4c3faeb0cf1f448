// ============================================================================
// RegistryStore - Embedded Database (redb)
// ============================================================================
// Persistent storage for the permission registry and admin audit trail.
// Default path: ~/.phantom/registry.redb (override via PHANTOM_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::{AssignmentRecord, RoleRecord, StoreStats};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::access::Permission;
use crate::admin::AuditEntry;
use crate::registry::RegistrySnapshot;

// Table definitions
const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");
const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");

const VERSION_KEY: &str = "meta:version";

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Role created on first run for the bootstrap administrator
pub const BOOTSTRAP_ROLE: &str = "council-admin";

/// Embedded store for registry snapshots
pub struct RegistryStore {
    db: Database,
    path: PathBuf,
}

impl RegistryStore {
    /// Open (or create) the store at the given path.
    /// If `path` is None, uses PHANTOM_DB_PATH env var or ~/.phantom/registry.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("PHANTOM_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let phantom_dir = home.join(".phantom");
            std::fs::create_dir_all(&phantom_dir)
                .map_err(|e| anyhow!("Failed to create .phantom directory: {}", e))?;
            phantom_dir.join("registry.redb")
        };

        info!("Opening registry store at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            for table in [ROLES, ASSIGNMENTS, META, AUDIT] {
                let _ = write_txn
                    .open_table(table)
                    .map_err(|e| anyhow!("Failed to create {} table: {}", table, e))?;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Snapshot Operations
    // ========================================================================

    /// Load the last saved snapshot, or None if nothing was ever saved
    pub fn load_snapshot(&self) -> Result<Option<RegistrySnapshot>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;

        let meta = read_txn.open_table(META)
            .map_err(|e| anyhow!("Failed to open meta table: {}", e))?;
        let stored = meta.get(VERSION_KEY)
            .map_err(|e| anyhow!("Failed to get version: {}", e))?;
        let version: u64 = match stored {
            Some(value) => bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize version: {}", e))?,
            None => return Ok(None),
        };

        let mut roles = BTreeMap::new();
        let table = read_txn.open_table(ROLES)
            .map_err(|e| anyhow!("Failed to open roles table: {}", e))?;
        let rows = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate roles: {}", e))?;
        for entry in rows {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let role: RoleRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize role: {}", e))?;
            roles.insert(role.name, role.permissions);
        }

        let mut assignments = BTreeMap::new();
        let table = read_txn.open_table(ASSIGNMENTS)
            .map_err(|e| anyhow!("Failed to open assignments table: {}", e))?;
        let rows = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate assignments: {}", e))?;
        for entry in rows {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let row: AssignmentRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize assignment: {}", e))?;
            assignments.insert(row.identity, row.roles);
        }

        debug!("Loaded registry snapshot v{}", version);
        Ok(Some(RegistrySnapshot::from_parts(version, roles, assignments)))
    }

    /// Replace the stored registry with `snapshot` in one write transaction
    pub fn save_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        self.record_mutation(Some(snapshot), &[])
    }

    /// Persist the outcome of one admin mutation atomically: the committed
    /// snapshot (None for a rejection) and its audit entries, oldest first.
    pub fn record_mutation(
        &self,
        snapshot: Option<&RegistrySnapshot>,
        audit: &[AuditEntry],
    ) -> Result<()> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        if let Some(snapshot) = snapshot {
            write_snapshot(&write_txn, snapshot)?;
        }
        write_audit(&write_txn, audit)?;
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        if let Some(snapshot) = snapshot {
            debug!("Saved registry snapshot v{}", snapshot.version());
        }
        Ok(())
    }

    /// Load the stored snapshot, seeding one on first run.
    /// The seed holds a `council-admin` role with both admin permissions,
    /// assigned to `bootstrap_admin` when given. A stored `council-admin`
    /// role left without holders is handed to `bootstrap_admin`.
    pub fn load_or_seed(&self, bootstrap_admin: Option<&str>) -> Result<RegistrySnapshot> {
        if let Some(snapshot) = self.load_snapshot()? {
            return match bootstrap_admin {
                Some(admin) => self.claim_bootstrap_role(snapshot, admin),
                None => Ok(snapshot),
            };
        }

        let seed = seed_snapshot(bootstrap_admin)?;
        self.save_snapshot(&seed)?;
        info!(
            "Seeded registry with {} role{}",
            BOOTSTRAP_ROLE,
            bootstrap_admin
                .map(|id| format!(" assigned to {}", id))
                .unwrap_or_default()
        );
        Ok(seed)
    }

    fn claim_bootstrap_role(
        &self,
        snapshot: RegistrySnapshot,
        admin: &str,
    ) -> Result<RegistrySnapshot> {
        let orphaned = snapshot.role(BOOTSTRAP_ROLE).is_some()
            && snapshot.holders_of(BOOTSTRAP_ROLE).next().is_none();
        if !orphaned {
            return Ok(snapshot);
        }
        if admin.trim().is_empty() {
            return Err(anyhow!("Bootstrap admin identity must not be empty"));
        }

        let mut next = snapshot.bumped();
        next.assign(admin, BOOTSTRAP_ROLE)?;
        self.save_snapshot(&next)?;
        info!(
            "Assigned unheld {} role to bootstrap admin {} (v{})",
            BOOTSTRAP_ROLE,
            admin,
            next.version()
        );
        Ok(next)
    }

    // ========================================================================
    // Audit Operations
    // ========================================================================

    pub fn store_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.record_mutation(None, std::slice::from_ref(entry))
    }

    /// Audit entries, oldest first
    pub fn list_audit(&self) -> Result<Vec<AuditEntry>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(AUDIT)
            .map_err(|e| anyhow!("Failed to open audit table: {}", e))?;

        let mut results = Vec::new();
        let rows = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate audit: {}", e))?;
        for entry in rows {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let audit: AuditEntry = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize audit entry: {}", e))?;
            results.push(audit);
        }
        Ok(results)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<StoreStats> {
        let snapshot = self.load_snapshot()?.unwrap_or_default();
        Ok(StoreStats {
            version: snapshot.version(),
            total_roles: snapshot.roles().len(),
            total_identities: snapshot.assignments().len(),
            total_audit_entries: self.count(AUDIT)? as usize,
        })
    }

    fn count(&self, definition: RecordTable) -> Result<u64> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(definition)
            .map_err(|e| anyhow!("Failed to open table: {}", e))?;
        table.len().map_err(|e| anyhow!("Failed to count entries: {}", e))
    }
}

/// Initial registry: the bootstrap admin role and, optionally, its holder
pub fn seed_snapshot(bootstrap_admin: Option<&str>) -> Result<RegistrySnapshot> {
    let mut roles = BTreeMap::new();
    roles.insert(
        BOOTSTRAP_ROLE.to_string(),
        [
            Permission::MANAGE_ROLES,
            Permission::MANAGE_PERMISSIONS,
            Permission::VIEW_DASHBOARD,
            Permission::VIEW_AUDIT,
        ]
        .into_iter()
        .collect(),
    );

    let mut assignments = BTreeMap::new();
    if let Some(admin) = bootstrap_admin {
        if admin.trim().is_empty() {
            return Err(anyhow!("Bootstrap admin identity must not be empty"));
        }
        assignments.insert(admin.to_string(), [BOOTSTRAP_ROLE.to_string()].into_iter().collect());
    }

    Ok(RegistrySnapshot::from_parts(0, roles, assignments))
}

fn write_snapshot(txn: &WriteTransaction, snapshot: &RegistrySnapshot) -> Result<()> {
    let mut table = txn.open_table(ROLES)
        .map_err(|e| anyhow!("Failed to open roles table: {}", e))?;
    clear_table(&mut table)?;
    for (name, permissions) in snapshot.roles() {
        let key = format!("roles:{}", name);
        let value = bincode::serialize(&RoleRecord {
            name: name.clone(),
            permissions: permissions.clone(),
        })
        .map_err(|e| anyhow!("Failed to serialize role: {}", e))?;
        table.insert(key.as_str(), value.as_slice())
            .map_err(|e| anyhow!("Failed to insert role: {}", e))?;
    }

    let mut table = txn.open_table(ASSIGNMENTS)
        .map_err(|e| anyhow!("Failed to open assignments table: {}", e))?;
    clear_table(&mut table)?;
    for (identity, roles) in snapshot.assignments() {
        let key = format!("assignments:{}", identity);
        let value = bincode::serialize(&AssignmentRecord {
            identity: identity.clone(),
            roles: roles.clone(),
        })
        .map_err(|e| anyhow!("Failed to serialize assignment: {}", e))?;
        table.insert(key.as_str(), value.as_slice())
            .map_err(|e| anyhow!("Failed to insert assignment: {}", e))?;
    }

    let mut table = txn.open_table(META)
        .map_err(|e| anyhow!("Failed to open meta table: {}", e))?;
    let value = bincode::serialize(&snapshot.version())
        .map_err(|e| anyhow!("Failed to serialize version: {}", e))?;
    table.insert(VERSION_KEY, value.as_slice())
        .map_err(|e| anyhow!("Failed to insert version: {}", e))?;
    Ok(())
}

fn write_audit(txn: &WriteTransaction, entries: &[AuditEntry]) -> Result<()> {
    let mut table = txn.open_table(AUDIT)
        .map_err(|e| anyhow!("Failed to open audit table: {}", e))?;
    let mut seq = table.len().map_err(|e| anyhow!("Failed to count audit entries: {}", e))?;
    for entry in entries {
        // Zero-padded so lexical order is chronological
        let key = format!("audit:{:020}:{:010}", entry.at, seq);
        // JSON: AdminOp is internally tagged, which bincode cannot decode
        let value = serde_json::to_vec(entry)
            .map_err(|e| anyhow!("Failed to serialize audit entry: {}", e))?;
        table.insert(key.as_str(), value.as_slice())
            .map_err(|e| anyhow!("Failed to insert audit entry: {}", e))?;
        seq += 1;
    }
    Ok(())
}

fn clear_table(table: &mut redb::Table<'_, &'static str, &'static [u8]>) -> Result<()> {
    let keys = table
        .range::<&str>(..)
        .map_err(|e| anyhow!("Failed to iterate table: {}", e))?
        .map(|entry| entry.map(|(key, _)| key.value().to_string()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Failed to read entry: {}", e))?;
    for key in keys {
        table.remove(key.as_str())
            .map_err(|e| anyhow!("Failed to remove {}: {}", key, e))?;
    }
    Ok(())
}
