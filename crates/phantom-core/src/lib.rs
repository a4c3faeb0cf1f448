//! ============================================================================
//! PHANTOM-CORE: Tiered Access Control
//! ============================================================================
//! Decides whether an identity may use a tool, admin page, or admin action:
//! - Tier ordering and tier-gated resource requirements
//! - Role-based permissions held in an atomically swapped registry
//! - Edge and view guards that enforce the same verdicts independently
//! - Gated role/permission administration with a redb-backed store
//! ============================================================================

pub mod access;
pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod identity;
pub mod registry;

// Re-export main types for convenience
pub use access::{
    AccessEvaluator, Decision, DefaultPolicy, DenialReason, Permission, Requirement,
    ResourceRegistry, Tier,
};
pub use admin::{AdminOp, AuditEntry, CommitResult, RoleAdmin};
pub use config::GateConfig;
pub use db::RegistryStore;
pub use error::{AdminError, ConfigError, PermissionError, UnknownTierError};
pub use guard::{
    EdgeDecision, EdgeGuard, EdgeRequest, EnforcementPoint, ViewDecision, ViewGuard, ViewSession,
};
pub use identity::{Identity, TierState};
pub use registry::{PermissionRegistry, RegistrySnapshot};
