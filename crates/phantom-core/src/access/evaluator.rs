//! ============================================================================
//! Access Evaluator - Pure authorization decisions
//! ============================================================================
//! Combines the tier axis and the permission axis per a [`Requirement`].
//! No I/O, no side effects: "not authorized" is a verdict, not an error.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::permission::Permission;
use super::requirement::{Combine, Requirement, ResourceRegistry};
use super::tier::Tier;
use crate::identity::{Identity, TierState};
use crate::registry::{PermissionRegistry, RegistrySnapshot};

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    /// No live connection
    Disconnected,
    /// Tier resolution has not completed
    Unresolved,
    /// Resource is closed to everyone (unregistered under deny-by-default)
    Sealed,
    /// Open resource, but the identity has no membership tier
    NotMember,
    InsufficientTier { have: Tier, need: Tier },
    MissingPermission { permission: Permission },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Disconnected => write!(f, "No wallet connected"),
            DenialReason::Unresolved => write!(f, "Membership tier is still being resolved"),
            DenialReason::Sealed => write!(f, "This resource is not available"),
            DenialReason::NotMember => write!(
                f,
                "Requires {} tier or higher",
                Tier::EntryLevel.display_name()
            ),
            DenialReason::InsufficientTier { have, need } => write!(
                f,
                "Requires {} tier. You have {} tier.",
                need.display_name(),
                have.display_name()
            ),
            DenialReason::MissingPermission { permission } => {
                write!(f, "Requires the {} permission", permission)
            }
        }
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Decision {
    Granted,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }

    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            Decision::Granted => None,
            Decision::Denied(reason) => Some(reason),
        }
    }
}

/// Inclusive tier threshold
pub fn has_tier_access(identity_tier: Tier, required_tier: Tier) -> bool {
    identity_tier.rank() >= required_tier.rank()
}

/// Membership in the union of the identity's role permissions
pub fn has_permission(
    snapshot: &RegistrySnapshot,
    identity: &Identity,
    permission: &Permission,
) -> bool {
    identity.connected && snapshot.grants(&identity.id, permission)
}

/// Full decision with a reason on denial
pub fn evaluate(
    snapshot: &RegistrySnapshot,
    identity: &Identity,
    requirement: &Requirement,
) -> Decision {
    if requirement.sealed {
        return Decision::Denied(DenialReason::Sealed);
    }

    // Anonymous-public resources are the only thing an absent or
    // unresolved identity can reach.
    if requirement.anonymous && requirement.is_unconstrained() {
        return Decision::Granted;
    }
    if !identity.connected {
        return Decision::Denied(DenialReason::Disconnected);
    }
    let tier = match identity.tier {
        TierState::Unresolved => return Decision::Denied(DenialReason::Unresolved),
        TierState::Resolved(tier) => tier,
    };

    let tier_check = requirement.tier.map(|need| {
        if has_tier_access(tier, need) {
            Ok(())
        } else {
            Err(DenialReason::InsufficientTier { have: tier, need })
        }
    });
    let permission_check = requirement.permission.as_ref().map(|permission| {
        if has_permission(snapshot, identity, permission) {
            Ok(())
        } else {
            Err(DenialReason::MissingPermission {
                permission: permission.clone(),
            })
        }
    });

    let outcome = match (tier_check, permission_check) {
        (None, None) => {
            if tier.is_member() {
                Ok(())
            } else {
                Err(DenialReason::NotMember)
            }
        }
        (Some(t), None) => t,
        (None, Some(p)) => p,
        (Some(t), Some(p)) => match requirement.combine {
            Combine::All => t.and(p),
            Combine::Any => p.or(t),
        },
    };

    match outcome {
        Ok(()) => Decision::Granted,
        Err(reason) => Decision::Denied(reason),
    }
}

/// Boolean form of [`evaluate`]
pub fn is_authorized(
    snapshot: &RegistrySnapshot,
    identity: &Identity,
    requirement: &Requirement,
) -> bool {
    evaluate(snapshot, identity, requirement).is_granted()
}

/// Evaluator bound to the shared registries.
/// Every call reads the latest committed snapshot.
#[derive(Clone)]
pub struct AccessEvaluator {
    permissions: Arc<PermissionRegistry>,
    resources: Arc<ResourceRegistry>,
}

impl AccessEvaluator {
    pub fn new(permissions: Arc<PermissionRegistry>, resources: Arc<ResourceRegistry>) -> Self {
        Self {
            permissions,
            resources,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionRegistry> {
        &self.permissions
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    pub fn has_permission(&self, identity: &Identity, permission: &Permission) -> bool {
        has_permission(&self.permissions.snapshot(), identity, permission)
    }

    pub fn is_authorized(&self, identity: &Identity, requirement: &Requirement) -> bool {
        is_authorized(&self.permissions.snapshot(), identity, requirement)
    }

    /// Evaluate an identity against a resource's registered requirement
    pub fn check_resource(&self, identity: &Identity, resource_id: &str) -> Decision {
        let requirement = self.resources.requirement_for(resource_id);
        let decision = evaluate(&self.permissions.snapshot(), identity, &requirement);
        debug!(
            "Evaluated {} for {} ({:?}): {:?}",
            resource_id,
            identity.id,
            identity.tier.effective(),
            decision
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_moderator() -> RegistrySnapshot {
        let mut snap = RegistrySnapshot::new();
        snap.create_role("moderator").unwrap();
        snap.grant("moderator", &Permission::VIEW_DASHBOARD).unwrap();
        snap.assign("wallet-mod", "moderator").unwrap();
        snap
    }

    #[test]
    fn test_tier_access_is_inclusive() {
        assert!(has_tier_access(Tier::Operator, Tier::Operator));
        assert!(has_tier_access(Tier::PhantomCouncil, Tier::EntryLevel));
        assert!(!has_tier_access(Tier::EntryLevel, Tier::Operator));
    }

    #[test]
    fn test_tier_access_is_monotonic() {
        for required in Tier::ALL {
            for a in Tier::ALL {
                for higher in Tier::ALL.iter().filter(|t| t.rank() >= a.rank()) {
                    if has_tier_access(a, required) {
                        assert!(has_tier_access(*higher, required));
                    }
                }
            }
        }
    }

    #[test]
    fn test_sandwich_attack_requires_council() {
        let snap = RegistrySnapshot::new();
        let req = ResourceRegistry::default().requirement_for("sandwich-attack");

        let elite = Identity::resolved("wallet-a", Tier::ShadowElite);
        let council = Identity::resolved("wallet-b", Tier::PhantomCouncil);
        assert!(!is_authorized(&snap, &elite, &req));
        assert!(is_authorized(&snap, &council, &req));
        assert_eq!(
            evaluate(&snap, &elite, &req),
            Decision::Denied(DenialReason::InsufficientTier {
                have: Tier::ShadowElite,
                need: Tier::PhantomCouncil,
            })
        );
    }

    #[test]
    fn test_unmapped_resource_uses_entry_level_default() {
        let snap = RegistrySnapshot::new();
        let req = ResourceRegistry::default().requirement_for("whale-tracker");

        assert!(is_authorized(&snap, &Identity::resolved("a", Tier::EntryLevel), &req));
        assert!(!is_authorized(&snap, &Identity::resolved("b", Tier::Unauthorized), &req));
    }

    #[test]
    fn test_permission_axis() {
        let snap = registry_with_moderator();
        let req = Requirement::permission(Permission::VIEW_DASHBOARD);

        // Tier is irrelevant for a permission-only requirement
        let moderator = Identity::resolved("wallet-mod", Tier::Unauthorized);
        let council = Identity::resolved("wallet-c", Tier::PhantomCouncil);
        assert!(is_authorized(&snap, &moderator, &req));
        assert!(!is_authorized(&snap, &council, &req));
    }

    #[test]
    fn test_both_axes_and_or() {
        let snap = registry_with_moderator();
        let moderator_low = Identity::resolved("wallet-mod", Tier::EntryLevel);
        let council = Identity::resolved("wallet-c", Tier::PhantomCouncil);

        let and = Requirement::tier_and_permission(Tier::Operator, Permission::VIEW_DASHBOARD);
        assert!(!is_authorized(&snap, &moderator_low, &and));
        assert!(!is_authorized(&snap, &council, &and));
        assert!(is_authorized(
            &snap,
            &Identity::resolved("wallet-mod", Tier::Operator),
            &and
        ));

        let or = Requirement::tier_or_permission(Tier::Operator, Permission::VIEW_DASHBOARD);
        assert!(is_authorized(&snap, &moderator_low, &or));
        assert!(is_authorized(&snap, &council, &or));
        assert!(!is_authorized(&snap, &Identity::resolved("x", Tier::EntryLevel), &or));
    }

    #[test]
    fn test_open_requirement_needs_member() {
        let snap = RegistrySnapshot::new();
        let open = Requirement::open();
        assert!(is_authorized(&snap, &Identity::resolved("a", Tier::EntryLevel), &open));
        assert_eq!(
            evaluate(&snap, &Identity::resolved("b", Tier::Unauthorized), &open),
            Decision::Denied(DenialReason::NotMember)
        );
    }

    #[test]
    fn test_anonymous_public_only_for_absent_identities() {
        let snap = registry_with_moderator();
        let mut gone = Identity::resolved("wallet-mod", Tier::PhantomCouncil);
        gone.disconnect();

        assert!(is_authorized(&snap, &gone, &Requirement::public()));
        assert!(is_authorized(&snap, &Identity::connected("x"), &Requirement::public()));
        for req in [
            Requirement::open(),
            Requirement::tier(Tier::EntryLevel),
            Requirement::permission(Permission::VIEW_DASHBOARD),
        ] {
            assert!(!is_authorized(&snap, &gone, &req));
        }
    }

    #[test]
    fn test_unresolved_never_allowed() {
        let snap = registry_with_moderator();
        let pending = Identity::connected("wallet-mod");
        assert_eq!(
            evaluate(&snap, &pending, &Requirement::permission(Permission::VIEW_DASHBOARD)),
            Decision::Denied(DenialReason::Unresolved)
        );
    }

    #[test]
    fn test_sealed_denies_everyone() {
        let snap = RegistrySnapshot::new();
        let council = Identity::resolved("c", Tier::PhantomCouncil);
        assert_eq!(
            evaluate(&snap, &council, &Requirement::sealed()),
            Decision::Denied(DenialReason::Sealed)
        );
    }

    #[test]
    fn test_evaluator_reads_latest_snapshot() {
        let permissions = Arc::new(PermissionRegistry::new());
        let evaluator =
            AccessEvaluator::new(permissions.clone(), Arc::new(ResourceRegistry::default()));
        let who = Identity::resolved("wallet-x", Tier::EntryLevel);
        assert!(!evaluator.check_resource(&who, "admin").is_granted());

        permissions
            .commit(|_, next| {
                next.create_role("moderator")?;
                next.grant("moderator", &Permission::VIEW_DASHBOARD)?;
                next.assign("wallet-x", "moderator")
            })
            .unwrap();
        assert!(evaluator.check_resource(&who, "admin").is_granted());
    }

    #[test]
    fn test_denial_messages() {
        let reason = DenialReason::InsufficientTier {
            have: Tier::Operator,
            need: Tier::ShadowElite,
        };
        assert_eq!(
            reason.to_string(),
            "Requires Shadow Elite tier. You have Operator tier."
        );
    }
}
