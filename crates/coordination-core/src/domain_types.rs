//! Semantic newtypes for the identifiers passed across the coordination
//! boundary, so a session id and a lock token can't be swapped by accident.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifies a caller across `acquire`/`release`/`heartbeat`/etc.
///
/// Defaults to `<prefix>-<pid>` when not explicitly configured, matching
/// the original implementation's `os.environ.get("CLAUDE_SESSION_ID", f"mcp-{os.getpid()}")`.
/// This default is unique per host only — multi-host deployments must set
/// `COORD_SESSION_ID` explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Build a `SessionId` from an explicit value.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `value` is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidArgument("session id must not be empty".into()));
        }
        Ok(Self(value))
    }

    /// Read `env_var` or fall back to `<prefix>-<pid>`.
    #[must_use]
    pub fn from_env_or_pid(env_var: &str, prefix: &str) -> Self {
        std::env::var(env_var)
            .ok()
            .filter(|s| !s.is_empty())
            .map_or_else(|| Self(format!("{prefix}-{}", std::process::id())), Self)
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller-supplied lock name, before NCR resolves it to a storage key.
///
/// May be a bare resource name (`"db-migration"`), an already-canonical
/// key (contains `:`), or the literal token `"work"` requesting
/// branch-based auto-detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Build a `LockToken`.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `value` is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidArgument("lock token must not be empty".into()));
        }
        Ok(Self(value))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this token is the special auto-detect token `"work"`.
    #[must_use]
    pub fn is_work_token(&self) -> bool {
        self.0 == "work"
    }

    /// Whether this token is already a canonical `scope:name` key.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.0.contains(':')
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A filesystem path identifying the caller's working copy, recorded on
/// lock and session records for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorktreePath(String);

impl WorktreePath {
    /// Wrap a path string as-is.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The current process's working directory, falling back to `"unknown"`
    /// if it cannot be determined.
    #[must_use]
    pub fn current_dir() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.to_str().map(str::to_string))
            .map_or_else(|| Self("unknown".into()), Self)
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorktreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
