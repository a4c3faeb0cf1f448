//! ============================================================================
//! Access Module - Tier and permission gated access control
//! ============================================================================
//! Two orthogonal axes decide access:
//!
//! ## Tiers
//! - **UNAUTHORIZED**: nothing beyond explicitly public resources
//! - **ENTRY_LEVEL**: basic tools, and the default for unmapped resources
//! - **OPERATOR**: routing tools
//! - **SHADOW_ELITE**: extraction tools
//! - **PHANTOM_COUNCIL**: everything tier-gated
//!
//! ## Permissions
//! Namespaced `domain:action` identifiers granted through roles, e.g.
//! `admin:manage-roles`.
//!
//! ## Usage
//! ```rust,ignore
//! use phantom_core::access::{AccessEvaluator, ResourceRegistry};
//!
//! let evaluator = AccessEvaluator::new(registry, Arc::new(ResourceRegistry::default()));
//! let decision = evaluator.check_resource(&identity, "mev-extraction");
//! ```
//! ============================================================================

pub mod evaluator;
pub mod permission;
mod requirement;
mod tier;

// Re-export public types
pub use evaluator::{
    evaluate, has_permission, has_tier_access, is_authorized, AccessEvaluator, Decision,
    DenialReason,
};
pub use permission::{Permission, PERMISSION_CATALOG};
pub use requirement::{Combine, DefaultPolicy, Requirement, ResourceRegistry};
pub use tier::Tier;
