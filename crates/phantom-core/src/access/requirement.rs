//! ============================================================================
//! Resource Requirements - What each protected resource demands
//! ============================================================================
//! A requirement combines an optional minimum tier and an optional
//! permission. The registry is total: every resource id resolves to *some*
//! requirement, so nothing is ever allowed by omission.
//! ============================================================================

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::permission::Permission;
use super::tier::Tier;

/// How the two axes combine when both are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Tier AND permission
    #[default]
    All,
    /// Tier OR permission
    Any,
}

/// Tier/permission precondition attached to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
    #[serde(default)]
    pub combine: Combine,
    /// Exposed to identities with no resolved membership
    #[serde(default)]
    pub anonymous: bool,
    /// Never satisfied. Produced for unregistered resources under
    /// [`DefaultPolicy::Deny`].
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sealed: bool,
}

impl Requirement {
    /// No requirement: any connected member
    pub fn open() -> Self {
        Self::default()
    }

    /// Explicitly public, including anonymous identities
    pub fn public() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            ..Self::default()
        }
    }

    pub fn permission(permission: Permission) -> Self {
        Self {
            permission: Some(permission),
            ..Self::default()
        }
    }

    /// Both axes must hold
    pub fn tier_and_permission(tier: Tier, permission: Permission) -> Self {
        Self {
            tier: Some(tier),
            permission: Some(permission),
            combine: Combine::All,
            ..Self::default()
        }
    }

    /// Either axis suffices
    pub fn tier_or_permission(tier: Tier, permission: Permission) -> Self {
        Self {
            combine: Combine::Any,
            ..Self::tier_and_permission(tier, permission)
        }
    }

    /// Denies everyone
    pub fn sealed() -> Self {
        Self {
            sealed: true,
            ..Self::default()
        }
    }

    /// Neither a tier nor a permission is named
    pub fn is_unconstrained(&self) -> bool {
        self.tier.is_none() && self.permission.is_none()
    }
}

/// Policy for resources with no explicit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPolicy {
    /// Lowest member tier, no permission
    #[default]
    EntryLevel,
    /// Require explicit registration; unmapped resources are never authorized
    Deny,
}

impl DefaultPolicy {
    pub fn requirement(&self) -> Requirement {
        match self {
            DefaultPolicy::EntryLevel => Requirement::tier(Tier::EntryLevel),
            DefaultPolicy::Deny => Requirement::sealed(),
        }
    }
}

/// Built-in tool and admin-page requirements
static BUILTIN_REQUIREMENTS: Lazy<BTreeMap<String, Requirement>> = Lazy::new(|| {
    let mut m = BTreeMap::new();
    let mut put = |id: &str, req: Requirement| {
        m.insert(id.to_string(), req);
    };

    // Tools
    put("gas-optimizer", Requirement::tier(Tier::EntryLevel));
    put("mempool-scanner", Requirement::tier(Tier::EntryLevel));
    put("stealth-router", Requirement::tier(Tier::Operator));
    put("liquidity-sniper", Requirement::tier(Tier::Operator));
    put("mev-extraction", Requirement::tier(Tier::ShadowElite));
    put("flash-loan-engine", Requirement::tier(Tier::ShadowElite));
    put("sandwich-attack", Requirement::tier(Tier::PhantomCouncil));
    put("dark-pool-access", Requirement::tier(Tier::PhantomCouncil));

    // Admin pages
    put("admin", Requirement::permission(Permission::VIEW_DASHBOARD));
    put("admin/roles", Requirement::permission(Permission::MANAGE_ROLES));
    put("admin/permissions", Requirement::permission(Permission::MANAGE_PERMISSIONS));
    put("admin/audit", Requirement::permission(Permission::VIEW_AUDIT));

    // Public
    put("upgrade", Requirement::public());
    m
});

/// Static resource -> requirement table with a total lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRegistry {
    entries: BTreeMap<String, Requirement>,
    default_policy: DefaultPolicy,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::builtin(DefaultPolicy::default())
    }
}

impl ResourceRegistry {
    /// Empty table: every lookup falls back to the default
    pub fn new(default_policy: DefaultPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_policy,
        }
    }

    /// Built-in table with the given default policy
    pub fn builtin(default_policy: DefaultPolicy) -> Self {
        Self {
            entries: BUILTIN_REQUIREMENTS.clone(),
            default_policy,
        }
    }

    /// Add or replace an entry
    pub fn with(mut self, resource_id: impl Into<String>, requirement: Requirement) -> Self {
        self.entries.insert(resource_id.into(), requirement);
        self
    }

    /// Requirement for a resource. Exact, case-sensitive match; never fails.
    pub fn requirement_for(&self, resource_id: &str) -> Requirement {
        match self.entries.get(resource_id) {
            Some(req) => req.clone(),
            None => {
                debug!(
                    "No requirement registered for '{}', applying {:?} default",
                    resource_id, self.default_policy
                );
                self.default_policy.requirement()
            }
        }
    }

    pub fn is_registered(&self, resource_id: &str) -> bool {
        self.entries.contains_key(resource_id)
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Requirement)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let reg = ResourceRegistry::default();
        assert_eq!(
            reg.requirement_for("sandwich-attack"),
            Requirement::tier(Tier::PhantomCouncil)
        );
        assert_eq!(
            reg.requirement_for("admin/roles"),
            Requirement::permission(Permission::MANAGE_ROLES)
        );
    }

    #[test]
    fn test_lookup_is_total() {
        let reg = ResourceRegistry::default();
        for id in ["whale-tracker", "", "SANDWICH-ATTACK", "../etc/passwd", "mev-extraction/"] {
            assert!(!reg.is_registered(id));
            assert_eq!(reg.requirement_for(id), Requirement::tier(Tier::EntryLevel));
        }
    }

    #[test]
    fn test_default_never_weaker_than_entry_level() {
        for policy in [DefaultPolicy::EntryLevel, DefaultPolicy::Deny] {
            let req = policy.requirement();
            assert!(req.sealed || req.tier.unwrap_or(Tier::Unauthorized) >= Tier::EntryLevel);
            assert!(!req.anonymous);
        }
    }

    #[test]
    fn test_custom_entry_overrides_builtin() {
        let reg = ResourceRegistry::new(DefaultPolicy::Deny)
            .with("whale-tracker", Requirement::tier(Tier::Operator));
        assert_eq!(reg.requirement_for("whale-tracker"), Requirement::tier(Tier::Operator));
        assert_eq!(reg.requirement_for("sandwich-attack"), DefaultPolicy::Deny.requirement());
    }

    #[test]
    fn test_requirement_json_shape() {
        let req: Requirement =
            serde_json::from_str(r#"{"tier":"OPERATOR","permission":"tools:execute"}"#).unwrap();
        assert_eq!(req.combine, Combine::All);
        assert!(!req.anonymous);
        assert_eq!(req.tier, Some(Tier::Operator));
    }
}
