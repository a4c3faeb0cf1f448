//! ============================================================================
//! Identity - The subject being authorized
//! ============================================================================
//! Tier resolution happens elsewhere (token holdings). Until it completes,
//! an identity reaches nothing but public resources.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::access::{Permission, Tier};
use crate::registry::RegistrySnapshot;

/// Tier resolution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "tier", rename_all = "snake_case")]
pub enum TierState {
    /// Connected, but resolution has not completed
    #[default]
    Unresolved,
    Resolved(Tier),
}

impl TierState {
    /// Tier to evaluate with. Unresolved never counts as pending-allow.
    pub fn effective(&self) -> Tier {
        match self {
            TierState::Unresolved => Tier::Unauthorized,
            TierState::Resolved(tier) => *tier,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TierState::Resolved(_))
    }
}

/// An authenticated subject (a connected wallet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Wallet address or other stable subject id
    pub id: String,
    pub connected: bool,
    pub tier: TierState,
}

impl Identity {
    /// Freshly connected, tier not yet resolved
    pub fn connected(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected: true,
            tier: TierState::Unresolved,
        }
    }

    /// Connected with a resolved tier
    pub fn resolved(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            connected: true,
            tier: TierState::Resolved(tier),
        }
    }

    /// Record the outcome of external tier resolution
    pub fn resolve(&mut self, tier: Tier) {
        self.tier = TierState::Resolved(tier);
    }

    /// Revert to UNAUTHORIZED with no connection
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.tier = TierState::Unresolved;
    }

    pub fn effective_tier(&self) -> Tier {
        if self.connected {
            self.tier.effective()
        } else {
            Tier::Unauthorized
        }
    }

    /// Permissions granted by the identity's roles in `snapshot`.
    /// A disconnected identity holds nothing.
    pub fn permissions(&self, snapshot: &RegistrySnapshot) -> BTreeSet<Permission> {
        if self.connected {
            snapshot.effective_permissions(&self.id)
        } else {
            BTreeSet::new()
        }
    }

    /// Holds either administrative permission
    pub fn is_admin(&self, snapshot: &RegistrySnapshot) -> bool {
        self.connected
            && (snapshot.grants(&self.id, &Permission::MANAGE_ROLES)
                || snapshot.grants(&self.id, &Permission::MANAGE_PERMISSIONS))
    }
}
