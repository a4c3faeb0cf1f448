//! ============================================================================
//! Permission Registry - Process-wide role and assignment state
//! ============================================================================
//! Readers grab the current `Arc<RegistrySnapshot>` and evaluate against it
//! without holding any lock. Writers build the next snapshot from a copy and
//! swap it in whole, so no reader can observe a half-applied mutation.
//!
//! ## Usage
//! ```rust,ignore
//! use phantom_core::registry::PermissionRegistry;
//!
//! let registry = PermissionRegistry::new();
//! let snapshot = registry.snapshot();
//! let perms = snapshot.effective_permissions("wallet-x");
//! ```
//! ============================================================================

mod snapshot;

pub use snapshot::{validate_role_name, RegistrySnapshot};

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::AdminError;

/// Shared permission registry with atomic snapshot swaps
pub struct PermissionRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    version_tx: watch::Sender<u64>,
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionRegistry {
    /// Empty registry at version 0
    pub fn new() -> Self {
        Self::from_snapshot(RegistrySnapshot::new())
    }

    /// Start from a previously stored snapshot
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let (version_tx, _) = watch::channel(snapshot.version());
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            version_tx,
        }
    }

    /// Current snapshot. Cheap: one `Arc` clone under a momentary read lock.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// Notified with the new version after every commit
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Build the next snapshot from the current one and publish it.
    ///
    /// `edit` receives the committed snapshot (for authorization checks) and
    /// a bumped copy to mutate. Writers are serialized; on error nothing is
    /// published.
    pub(crate) fn commit<F>(&self, edit: F) -> Result<Arc<RegistrySnapshot>, AdminError>
    where
        F: FnOnce(&RegistrySnapshot, &mut RegistrySnapshot) -> Result<(), AdminError>,
    {
        let mut slot = self.current.write();
        let committed: &RegistrySnapshot = &slot;
        let mut next = committed.bumped();
        edit(committed, &mut next)?;

        let next = Arc::new(next);
        *slot = Arc::clone(&next);
        drop(slot);

        debug!("Registry committed version {}", next.version());
        self.version_tx.send_replace(next.version());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Permission;

    #[test]
    fn test_failed_commit_publishes_nothing() {
        let registry = PermissionRegistry::new();
        let before = registry.snapshot();

        let result = registry.commit(|_, next| {
            next.create_role("moderator")?;
            next.grant("ghost", &Permission::VIEW_AUDIT)
        });

        assert!(matches!(result, Err(AdminError::RoleNotFound(_))));
        assert_eq!(*registry.snapshot(), *before);
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn test_old_snapshots_stay_valid() {
        let registry = PermissionRegistry::new();
        let old = registry.snapshot();
        registry.commit(|_, next| next.create_role("moderator")).unwrap();

        assert!(old.role("moderator").is_none());
        assert!(registry.snapshot().role("moderator").is_some());
        assert_eq!(registry.version(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_version() {
        let registry = PermissionRegistry::new();
        let mut rx = registry.subscribe();
        registry.commit(|_, next| next.create_role("moderator")).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
