//! The immutable bundle of capabilities a caller acts through, per design
//! note 9: a session id, a worktree, a clock, and a branch provider — never
//! a process-global.

use std::sync::Arc;

use crate::branch::BranchProvider;
use crate::clock::Clock;
use crate::domain_types::{SessionId, WorktreePath};
use crate::naming::{self, BranchContext};

/// Everything a coordination call needs to know about who is calling and
/// from where, bundled so it can be constructed once per request and
/// passed by reference.
#[derive(Clone)]
pub struct SessionContext {
    /// The caller's session id.
    pub session_id: SessionId,
    /// The caller's worktree.
    pub worktree: WorktreePath,
    /// Time source, for TTL math and staleness classification.
    pub clock: Arc<dyn Clock>,
    /// Branch lookup, for resolving the `"work"` auto-detect token.
    pub branch_provider: Arc<dyn BranchProvider>,
}

impl SessionContext {
    /// Build a context from its parts.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        worktree: WorktreePath,
        clock: Arc<dyn Clock>,
        branch_provider: Arc<dyn BranchProvider>,
    ) -> Self {
        Self {
            session_id,
            worktree,
            clock,
            branch_provider,
        }
    }

    /// Resolve the caller's current [`BranchContext`] via the branch
    /// provider. Pure with respect to this struct — the impurity lives
    /// entirely inside the injected `branch_provider`.
    #[must_use]
    pub fn branch_context(&self) -> BranchContext {
        naming::parse_branch_context(self.branch_provider.current_branch().as_deref())
    }
}
