//! ============================================================================
//! View Guard - Fine-grained check with the fully resolved identity
//! ============================================================================
//! Runs the evaluator for a resource and turns the verdict into render,
//! an access-denied view, or a redirect. `ViewSession` re-runs it whenever
//! the identity's connection, tier, or the registry version changes.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::EnforcementPoint;
use crate::access::{evaluate, Decision, DenialReason, ResourceRegistry};
use crate::identity::{Identity, TierState};
use crate::registry::RegistrySnapshot;

/// What to do when the evaluator says no
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DenialMode {
    /// Render an access-denied view with the reason
    #[default]
    ShowReason,
    /// Redirect to the fallback without revealing the gate
    Conceal,
}

/// Input for one view evaluation
#[derive(Debug, Clone, Copy)]
pub struct ViewRequest<'a> {
    pub identity: Option<&'a Identity>,
    pub snapshot: &'a RegistrySnapshot,
    pub resource_id: &'a str,
}

/// View verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ViewDecision {
    Render,
    Denied { reason: DenialReason },
    Redirect { location: String },
}

/// Presentation-layer enforcement point
#[derive(Debug, Clone)]
pub struct ViewGuard {
    resources: Arc<ResourceRegistry>,
    entry: String,
    fallback: String,
    mode: DenialMode,
}

impl ViewGuard {
    pub fn new(
        resources: Arc<ResourceRegistry>,
        entry: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            resources,
            entry: entry.into(),
            fallback: fallback.into(),
            mode: DenialMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: DenialMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DenialMode {
        self.mode
    }
}

impl EnforcementPoint for ViewGuard {
    type Input<'a> = ViewRequest<'a>;
    type Verdict = ViewDecision;

    fn enforce<'a>(&self, request: ViewRequest<'a>) -> ViewDecision {
        let requirement = self.resources.requirement_for(request.resource_id);

        let identity = match request.identity {
            Some(identity) if identity.connected => identity,
            _ => {
                // Public pages still render without a wallet
                if requirement.anonymous && requirement.is_unconstrained() {
                    return ViewDecision::Render;
                }
                debug!(
                    "View: no identity for {}, redirecting to {}",
                    request.resource_id, self.entry
                );
                return ViewDecision::Redirect {
                    location: self.entry.clone(),
                };
            }
        };

        match evaluate(request.snapshot, identity, &requirement) {
            Decision::Granted => ViewDecision::Render,
            Decision::Denied(reason) => {
                info!(
                    "View: {} denied {} ({})",
                    request.resource_id, identity.id, reason
                );
                match self.mode {
                    DenialMode::ShowReason => ViewDecision::Denied { reason },
                    DenialMode::Conceal => ViewDecision::Redirect {
                        location: self.fallback.clone(),
                    },
                }
            }
        }
    }
}

/// Identity state a decision was computed from
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    identity_id: Option<String>,
    connected: bool,
    tier: TierState,
    registry_version: u64,
}

impl Fingerprint {
    fn of(identity: Option<&Identity>, snapshot: &RegistrySnapshot) -> Self {
        Self {
            identity_id: identity.map(|i| i.id.clone()),
            connected: identity.map(|i| i.connected).unwrap_or(false),
            tier: identity.map(|i| i.tier).unwrap_or_default(),
            registry_version: snapshot.version(),
        }
    }
}

/// A mounted view that re-evaluates on identity or registry transitions
#[derive(Debug)]
pub struct ViewSession {
    guard: ViewGuard,
    resource_id: String,
    last: Option<(Fingerprint, ViewDecision)>,
    commits: Option<watch::Receiver<u64>>,
}

impl ViewSession {
    pub fn mount(guard: ViewGuard, resource_id: impl Into<String>) -> Self {
        Self {
            guard,
            resource_id: resource_id.into(),
            last: None,
            commits: None,
        }
    }

    /// Follow registry commits (see [`PermissionRegistry::subscribe`])
    ///
    /// [`PermissionRegistry::subscribe`]: crate::registry::PermissionRegistry::subscribe
    pub fn follow(mut self, commits: watch::Receiver<u64>) -> Self {
        self.commits = Some(commits);
        self
    }

    /// Wait for the next registry commit and report whether the current
    /// decision went stale. `None` when not following or the registry is gone.
    pub async fn next_commit(&mut self) -> Option<bool> {
        let commits = self.commits.as_mut()?;
        commits.changed().await.ok()?;
        let version = *commits.borrow_and_update();
        debug!("View: {} saw registry v{}", self.resource_id, version);
        Some(self.is_stale(version))
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Current decision. Recomputed if anything it depends on moved;
    /// the bool reports whether the decision was recomputed.
    pub fn observe(
        &mut self,
        identity: Option<&Identity>,
        snapshot: &RegistrySnapshot,
    ) -> (ViewDecision, bool) {
        let fingerprint = Fingerprint::of(identity, snapshot);
        if let Some((seen, decision)) = &self.last {
            if *seen == fingerprint {
                return (decision.clone(), false);
            }
        }

        let decision = self.guard.enforce(ViewRequest {
            identity,
            snapshot,
            resource_id: &self.resource_id,
        });
        self.last = Some((fingerprint, decision.clone()));
        (decision, true)
    }

    /// True when a registry commit happened since the last evaluation
    pub fn is_stale(&self, registry_version: u64) -> bool {
        self.last
            .as_ref()
            .map(|(seen, _)| seen.registry_version != registry_version)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Permission, Tier};
    use crate::registry::PermissionRegistry;

    fn guard() -> ViewGuard {
        ViewGuard::new(Arc::new(ResourceRegistry::default()), "/", "/dashboard")
    }

    #[test]
    fn test_no_identity_redirects_to_entry() {
        let snap = RegistrySnapshot::new();
        let verdict = guard().enforce(ViewRequest {
            identity: None,
            snapshot: &snap,
            resource_id: "mev-extraction",
        });
        assert_eq!(verdict, ViewDecision::Redirect { location: "/".into() });
    }

    #[test]
    fn test_public_page_renders_without_identity() {
        let snap = RegistrySnapshot::new();
        let verdict = guard().enforce(ViewRequest {
            identity: None,
            snapshot: &snap,
            resource_id: "upgrade",
        });
        assert_eq!(verdict, ViewDecision::Render);
    }

    #[test]
    fn test_denial_modes() {
        let snap = RegistrySnapshot::new();
        let operator = Identity::resolved("wallet-x", Tier::Operator);
        let request = ViewRequest {
            identity: Some(&operator),
            snapshot: &snap,
            resource_id: "mev-extraction",
        };

        assert_eq!(
            guard().enforce(request),
            ViewDecision::Denied {
                reason: DenialReason::InsufficientTier {
                    have: Tier::Operator,
                    need: Tier::ShadowElite,
                }
            }
        );
        assert_eq!(
            guard().with_mode(DenialMode::Conceal).enforce(request),
            ViewDecision::Redirect {
                location: "/dashboard".into()
            }
        );
    }

    #[test]
    fn test_session_reevaluates_on_tier_resolution() {
        let snap = RegistrySnapshot::new();
        let mut session = ViewSession::mount(guard(), "stealth-router");
        let mut who = Identity::connected("wallet-x");

        let (first, recomputed) = session.observe(Some(&who), &snap);
        assert!(recomputed);
        assert_eq!(
            first,
            ViewDecision::Denied {
                reason: DenialReason::Unresolved
            }
        );

        let (_, recomputed) = session.observe(Some(&who), &snap);
        assert!(!recomputed);

        who.resolve(Tier::Operator);
        let (second, recomputed) = session.observe(Some(&who), &snap);
        assert!(recomputed);
        assert_eq!(second, ViewDecision::Render);

        who.disconnect();
        let (third, _) = session.observe(Some(&who), &snap);
        assert_eq!(third, ViewDecision::Redirect { location: "/".into() });
    }

    #[tokio::test]
    async fn test_followed_session_wakes_on_commit() {
        let registry = Arc::new(PermissionRegistry::new());
        let mut session = ViewSession::mount(guard(), "admin").follow(registry.subscribe());
        let who = Identity::resolved("wallet-x", Tier::EntryLevel);

        let (before, _) = session.observe(Some(&who), &registry.snapshot());
        assert!(matches!(before, ViewDecision::Denied { .. }));

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .commit(|_, next| {
                        next.create_role("moderator")?;
                        next.grant("moderator", &Permission::VIEW_DASHBOARD)?;
                        next.assign("wallet-x", "moderator")
                    })
                    .unwrap();
            })
        };

        assert_eq!(session.next_commit().await, Some(true));
        writer.await.unwrap();
        let (after, recomputed) = session.observe(Some(&who), &registry.snapshot());
        assert!(recomputed);
        assert_eq!(after, ViewDecision::Render);
    }

    #[tokio::test]
    async fn test_unfollowed_session_has_no_commits() {
        let mut session = ViewSession::mount(guard(), "admin");
        assert_eq!(session.next_commit().await, None);
    }

    #[test]
    fn test_session_reevaluates_on_registry_commit() {
        let registry = PermissionRegistry::new();
        let mut session = ViewSession::mount(guard(), "admin/audit");
        let who = Identity::resolved("wallet-x", Tier::EntryLevel);

        let (before, _) = session.observe(Some(&who), &registry.snapshot());
        assert!(matches!(before, ViewDecision::Denied { .. }));

        registry
            .commit(|_, next| {
                next.create_role("auditor")?;
                next.grant("auditor", &Permission::VIEW_AUDIT)?;
                next.assign("wallet-x", "auditor")
            })
            .unwrap();
        assert!(session.is_stale(registry.version()));

        let (after, recomputed) = session.observe(Some(&who), &registry.snapshot());
        assert!(recomputed);
        assert_eq!(after, ViewDecision::Render);
        assert!(!session.is_stale(registry.version()));
    }
}
