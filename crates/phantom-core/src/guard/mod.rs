//! ============================================================================
//! Guards - Independent enforcement points
//! ============================================================================
//! Two checkpoints with different information:
//! - **Edge**: sees only whether a session credential is attached
//! - **View**: sees the resolved identity, tier, and permissions
//!
//! They share no lock or transaction and may briefly disagree while an
//! identity is transitioning. The view guard is the authority of record.
//! ============================================================================

mod edge;
mod view;

pub use edge::{EdgeDecision, EdgeGuard, EdgeRequest, PathRule};
pub use view::{DenialMode, ViewDecision, ViewGuard, ViewRequest, ViewSession};

/// A checkpoint that turns its input into a verdict
pub trait EnforcementPoint {
    type Input<'a>;
    type Verdict;

    fn enforce<'a>(&self, input: Self::Input<'a>) -> Self::Verdict;
}
