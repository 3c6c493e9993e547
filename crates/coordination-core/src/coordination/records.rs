//! Wire shapes stored in the backend, matching the original JSON session
//! and lock payloads (`session_id`, `worktree`, `acquired_at`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The value stored at `<root>:locks:<scope>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The session that holds the lock.
    pub session_id: String,
    /// The holder's worktree, for diagnostics.
    pub worktree: String,
    /// When the lock was first acquired (unchanged across idempotent
    /// re-acquisitions and extensions).
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires absent a refresh.
    pub expires_at: DateTime<Utc>,
}

/// The value stored at `<root>:sessions:<id>`. Carries no TTL — sessions
/// are removed only by `unregister`, never by expiry (Open Question
/// resolution: the original never sets an expiry on the session key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The session's own id, duplicated into the value for convenience.
    pub session_id: String,
    /// The worktree the session registered from.
    pub worktree: String,
    /// When `register` was called.
    pub started_at: DateTime<Utc>,
    /// Free-form metadata supplied at registration.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Session status as of the last heartbeat, e.g. `"active"`.
    #[serde(default = "default_status")]
    pub status: String,
    /// When the session last heartbeat, distinct from the heartbeat key's
    /// own TTL — this is the value the record itself remembers.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "active".to_string()
}
