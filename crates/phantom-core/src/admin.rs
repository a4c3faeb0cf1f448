//! ============================================================================
//! Role Administration - Gated mutations of the permission registry
//! ============================================================================
//! Every mutation is authorized through the same evaluator the guards use:
//! - Role definition edits need `admin:manage-roles`
//! - Identity <-> role assignment needs `admin:manage-permissions`
//!
//! An actor can never end up holding a permission it did not already hold.
//! Each accepted mutation is one atomic snapshot commit; a rejected one
//! leaves the registry untouched.
//! ============================================================================

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{evaluate, Decision, DenialReason, Permission, Requirement};
use crate::error::AdminError;
use crate::identity::Identity;
use crate::registry::{PermissionRegistry, RegistrySnapshot};

/// Audit entries kept in memory
const MAX_AUDIT_ENTRIES: usize = 500;

/// Committed snapshot, or why the mutation was refused
pub type CommitResult = Result<Arc<RegistrySnapshot>, AdminError>;

/// A single administrative mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminOp {
    CreateRole { role: String },
    RenameRole { from: String, to: String },
    DeleteRole { role: String },
    Grant { role: String, permission: Permission },
    Revoke { role: String, permission: Permission },
    Assign { identity: String, role: String },
    Unassign { identity: String, role: String },
}

impl AdminOp {
    /// Permission the actor must hold
    pub fn required_permission(&self) -> Permission {
        match self {
            AdminOp::CreateRole { .. }
            | AdminOp::RenameRole { .. }
            | AdminOp::DeleteRole { .. }
            | AdminOp::Grant { .. }
            | AdminOp::Revoke { .. } => Permission::MANAGE_ROLES,
            AdminOp::Assign { .. } | AdminOp::Unassign { .. } => Permission::MANAGE_PERMISSIONS,
        }
    }

    fn apply(&self, next: &mut RegistrySnapshot) -> Result<(), AdminError> {
        match self {
            AdminOp::CreateRole { role } => next.create_role(role),
            AdminOp::RenameRole { from, to } => next.rename_role(from, to),
            AdminOp::DeleteRole { role } => next.delete_role(role),
            AdminOp::Grant { role, permission } => next.grant(role, permission),
            AdminOp::Revoke { role, permission } => next.revoke(role, permission),
            AdminOp::Assign { identity, role } => next.assign(identity, role),
            AdminOp::Unassign { identity, role } => next.unassign(identity, role),
        }
    }
}

impl fmt::Display for AdminOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminOp::CreateRole { role } => write!(f, "create role {}", role),
            AdminOp::RenameRole { from, to } => write!(f, "rename role {} -> {}", from, to),
            AdminOp::DeleteRole { role } => write!(f, "delete role {}", role),
            AdminOp::Grant { role, permission } => write!(f, "grant {} to {}", permission, role),
            AdminOp::Revoke { role, permission } => {
                write!(f, "revoke {} from {}", permission, role)
            }
            AdminOp::Assign { identity, role } => write!(f, "assign {} to {}", role, identity),
            AdminOp::Unassign { identity, role } => {
                write!(f, "unassign {} from {}", role, identity)
            }
        }
    }
}

/// Record of one attempted mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: i64,
    pub actor: String,
    pub op: AdminOp,
    /// Registry version committed, or the rejection message
    pub outcome: Result<u64, String>,
}

/// Mutation surface over the shared registry
pub struct RoleAdmin {
    registry: Arc<PermissionRegistry>,
    audit: Mutex<VecDeque<AuditEntry>>,
}

impl RoleAdmin {
    pub fn new(registry: Arc<PermissionRegistry>) -> Self {
        Self {
            registry,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry> {
        &self.registry
    }

    /// Authorize and commit one mutation
    pub fn apply(&self, actor: &Identity, op: AdminOp) -> CommitResult {
        let result = self.registry.commit(|committed, next| {
            authorize(committed, actor, &op)?;
            op.apply(next)?;
            reject_self_escalation(committed, next, actor)
        });

        match &result {
            Ok(snapshot) => info!(
                "Admin: {} by {} committed v{}",
                op,
                actor.id,
                snapshot.version()
            ),
            Err(e) if e.is_denial() => warn!("Admin: {} by {} denied: {}", op, actor.id, e),
            Err(e) => warn!("Admin: {} by {} failed: {}", op, actor.id, e),
        }
        self.record(actor, op, &result);
        result
    }

    pub fn create_role(&self, actor: &Identity, role: &str) -> CommitResult {
        self.apply(actor, AdminOp::CreateRole { role: role.to_string() })
    }

    pub fn rename_role(&self, actor: &Identity, from: &str, to: &str) -> CommitResult {
        self.apply(
            actor,
            AdminOp::RenameRole {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
    }

    pub fn delete_role(&self, actor: &Identity, role: &str) -> CommitResult {
        self.apply(actor, AdminOp::DeleteRole { role: role.to_string() })
    }

    pub fn grant_permission(
        &self,
        actor: &Identity,
        role: &str,
        permission: Permission,
    ) -> CommitResult {
        self.apply(
            actor,
            AdminOp::Grant {
                role: role.to_string(),
                permission,
            },
        )
    }

    pub fn revoke_permission(
        &self,
        actor: &Identity,
        role: &str,
        permission: Permission,
    ) -> CommitResult {
        self.apply(
            actor,
            AdminOp::Revoke {
                role: role.to_string(),
                permission,
            },
        )
    }

    pub fn assign_role(&self, actor: &Identity, identity: &str, role: &str) -> CommitResult {
        self.apply(
            actor,
            AdminOp::Assign {
                identity: identity.to_string(),
                role: role.to_string(),
            },
        )
    }

    pub fn unassign_role(&self, actor: &Identity, identity: &str, role: &str) -> CommitResult {
        self.apply(
            actor,
            AdminOp::Unassign {
                identity: identity.to_string(),
                role: role.to_string(),
            },
        )
    }

    /// Most recent entries first
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().iter().rev().cloned().collect()
    }

    fn record(&self, actor: &Identity, op: AdminOp, result: &CommitResult) {
        let entry = AuditEntry {
            at: Utc::now().timestamp(),
            actor: actor.id.clone(),
            op,
            outcome: result
                .as_ref()
                .map(|snapshot| snapshot.version())
                .map_err(|e| e.to_string()),
        };

        let mut audit = self.audit.lock();
        if audit.len() >= MAX_AUDIT_ENTRIES {
            audit.pop_front();
        }
        audit.push_back(entry);
    }
}

/// Actor must hold the op's permission in the committed snapshot
fn authorize(
    committed: &RegistrySnapshot,
    actor: &Identity,
    op: &AdminOp,
) -> Result<(), AdminError> {
    let required = op.required_permission();
    match evaluate(committed, actor, &Requirement::permission(required.clone())) {
        Decision::Granted => Ok(()),
        Decision::Denied(DenialReason::Disconnected | DenialReason::Unresolved) => {
            Err(AdminError::UnresolvedActor {
                actor: actor.id.clone(),
            })
        }
        Decision::Denied(_) => Err(AdminError::Forbidden {
            actor: actor.id.clone(),
            required,
        }),
    }
}

/// The mutation must not hand the actor anything new
fn reject_self_escalation(
    committed: &RegistrySnapshot,
    next: &RegistrySnapshot,
    actor: &Identity,
) -> Result<(), AdminError> {
    let held = committed.effective_permissions(&actor.id);
    match next
        .effective_permissions(&actor.id)
        .into_iter()
        .find(|p| !held.contains(p))
    {
        Some(permission) => Err(AdminError::SelfEscalation {
            actor: actor.id.clone(),
            permission,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{has_permission, Tier};

    const ROOT: &str = "wallet-root";
    const Y: &str = "wallet-y";
    const X: &str = "wallet-x";

    /// root holds both admin permissions; Y holds manage-roles; X holds an
    /// empty moderator role
    fn setup() -> (RoleAdmin, Identity, Identity, Identity) {
        let mut snap = RegistrySnapshot::new();
        snap.create_role("council-admin").unwrap();
        snap.grant("council-admin", &Permission::MANAGE_ROLES).unwrap();
        snap.grant("council-admin", &Permission::MANAGE_PERMISSIONS).unwrap();
        snap.assign(ROOT, "council-admin").unwrap();
        snap.create_role("role-editor").unwrap();
        snap.grant("role-editor", &Permission::MANAGE_ROLES).unwrap();
        snap.assign(Y, "role-editor").unwrap();
        snap.create_role("moderator").unwrap();
        snap.assign(X, "moderator").unwrap();

        let admin = RoleAdmin::new(Arc::new(PermissionRegistry::from_snapshot(snap)));
        (
            admin,
            Identity::resolved(ROOT, Tier::PhantomCouncil),
            Identity::resolved(Y, Tier::Operator),
            Identity::resolved(X, Tier::EntryLevel),
        )
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let (admin, _, _, x) = setup();
        let before = admin.registry().snapshot();

        let err = admin
            .grant_permission(&x, "moderator", Permission::MANAGE_PERMISSIONS)
            .unwrap_err();

        assert_eq!(
            err,
            AdminError::Forbidden {
                actor: X.into(),
                required: Permission::MANAGE_ROLES,
            }
        );
        assert!(err.is_denial());
        assert_eq!(*admin.registry().snapshot(), *before);
        assert!(admin.registry().snapshot().role("moderator").unwrap().is_empty());
    }

    #[test]
    fn test_grant_is_visible_immediately() {
        let (admin, _, y, x) = setup();
        let snapshot = admin
            .grant_permission(&y, "moderator", Permission::MANAGE_PERMISSIONS)
            .unwrap();
        assert_eq!(snapshot.version(), 1);

        let latest = admin.registry().snapshot();
        assert!(has_permission(&latest, &x, &Permission::MANAGE_PERMISSIONS));
    }

    #[test]
    fn test_no_non_admin_can_mutate_roles() {
        let (admin, _, _, x) = setup();
        let before = admin.registry().snapshot();
        let attempts = vec![
            AdminOp::CreateRole { role: "rogue".into() },
            AdminOp::RenameRole {
                from: "moderator".into(),
                to: "overlord".into(),
            },
            AdminOp::DeleteRole { role: "council-admin".into() },
            AdminOp::Grant {
                role: "moderator".into(),
                permission: Permission::MANAGE_ROLES,
            },
            AdminOp::Assign {
                identity: X.into(),
                role: "council-admin".into(),
            },
        ];
        for op in attempts {
            assert!(admin.apply(&x, op).unwrap_err().is_denial());
        }
        assert_eq!(*admin.registry().snapshot(), *before);
    }

    #[test]
    fn test_assignment_needs_manage_permissions() {
        let (admin, root, y, _) = setup();
        let err = admin.assign_role(&y, "wallet-z", "moderator").unwrap_err();
        assert!(matches!(
            err,
            AdminError::Forbidden { required, .. } if required == Permission::MANAGE_PERMISSIONS
        ));

        admin.assign_role(&root, "wallet-z", "moderator").unwrap();
        assert!(admin
            .registry()
            .snapshot()
            .roles_of("wallet-z")
            .any(|r| r == "moderator"));
    }

    #[test]
    fn test_self_escalation_rejected() {
        let (admin, _, y, _) = setup();
        // Y edits its own role to add a permission it lacks
        let err = admin
            .grant_permission(&y, "role-editor", Permission::MANAGE_PERMISSIONS)
            .unwrap_err();
        assert_eq!(
            err,
            AdminError::SelfEscalation {
                actor: Y.into(),
                permission: Permission::MANAGE_PERMISSIONS,
            }
        );

        // Editing a role Y does not hold is fine
        admin.create_role(&y, "helper").unwrap();
        admin
            .grant_permission(&y, "helper", Permission::MANAGE_ROLES)
            .unwrap();
    }

    #[test]
    fn test_unresolved_actor_rejected() {
        let (admin, _, _, _) = setup();
        let pending = Identity::connected(ROOT);
        assert_eq!(
            admin.create_role(&pending, "new-role").unwrap_err(),
            AdminError::UnresolvedActor { actor: ROOT.into() }
        );
    }

    #[test]
    fn test_data_errors_are_not_denials() {
        let (admin, root, _, _) = setup();
        let err = admin.create_role(&root, "moderator").unwrap_err();
        assert_eq!(err, AdminError::RoleExists("moderator".into()));
        assert!(!err.is_denial());
        assert_eq!(admin.registry().version(), 0);
    }

    #[test]
    fn test_revoke_and_unassign() {
        let (admin, root, _, x) = setup();
        admin
            .grant_permission(&root, "moderator", Permission::VIEW_DASHBOARD)
            .unwrap();
        assert!(has_permission(&admin.registry().snapshot(), &x, &Permission::VIEW_DASHBOARD));

        admin.unassign_role(&root, X, "moderator").unwrap();
        assert!(!has_permission(&admin.registry().snapshot(), &x, &Permission::VIEW_DASHBOARD));

        admin
            .revoke_permission(&root, "moderator", Permission::VIEW_DASHBOARD)
            .unwrap();
        assert!(admin.registry().snapshot().role("moderator").unwrap().is_empty());
    }

    #[test]
    fn test_audit_log_records_outcomes() {
        let (admin, root, _, x) = setup();
        admin.create_role(&root, "analyst").unwrap();
        let _ = admin.create_role(&x, "rogue");

        let log = admin.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].actor, X);
        assert!(log[0].outcome.is_err());
        assert_eq!(log[1].outcome, Ok(1));
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_partial_role() {
        let (admin, root, _, _) = setup();
        let admin = Arc::new(admin);
        let registry = admin.registry().clone();

        let writer = {
            let admin = admin.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let role = format!("squad-{}", i);
                    admin.create_role(&root, &role).unwrap();
                    admin
                        .grant_permission(&root, &role, Permission::VIEW_DASHBOARD)
                        .unwrap();
                    admin.assign_role(&root, &format!("wallet-{}", i), &role).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let snap = registry.snapshot();
                        // Every assignment points at a role that exists in the same view
                        for (wallet, roles) in snap.assignments() {
                            for role in roles {
                                assert!(snap.role(role).is_some(), "{wallet} holds missing {role}");
                            }
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(registry.version(), 150);
    }
}
