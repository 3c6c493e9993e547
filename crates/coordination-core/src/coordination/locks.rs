//! Lock Manager: acquire/release/check/list over the KVG, grounded on the
//! teacher's `LockManager` (idempotent `lock`, owner-guarded `unlock`,
//! `heartbeat`, `get_all_locks`) but TTL-bound via the backend instead of
//! SQLite row expiry, and backed by NCR for token→key resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::records::LockRecord;
use crate::clock::Clock;
use crate::domain_types::{LockToken, SessionId, WorktreePath};
use crate::error::Result;
use crate::kvg::KeyValueGateway;
use crate::naming::{self, BranchContext};

/// Why an acquire attempt was denied. Maps to the spec's closed `reason`
/// set (`lock_held`, `race_condition`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Another session already holds the lock.
    LockHeld,
    /// The atomic acquire lost a race to a concurrent acquirer.
    RaceLost,
}

/// Result of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock is held by the caller, either freshly acquired or extended.
    Acquired {
        /// The canonical storage key.
        lock_key: String,
        /// `true` if this was an idempotent re-acquire/extend of an
        /// already-held lock rather than a brand new acquisition.
        extended: bool,
        /// New expiry.
        expires_at: DateTime<Utc>,
    },
    /// The lock could not be acquired.
    Denied {
        /// Which of the two denial reasons applied.
        reason: DenyReason,
        /// The session currently holding it, if known.
        held_by: String,
        /// The holder's worktree, if known.
        worktree: String,
        /// Original acquisition time, if known.
        acquired_at: DateTime<Utc>,
        /// Current expiry, if known.
        expires_at: DateTime<Utc>,
    },
}

/// Result of [`LockManager::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock was held by the caller and is now removed.
    Released {
        /// The canonical storage key that was deleted.
        lock_key: String,
    },
    /// No lock existed at that key.
    NotFound,
    /// A lock existed but is held by a different session.
    NotOwner {
        /// The session actually holding it.
        held_by: String,
    },
}

/// Result of [`LockManager::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No lock held at that key.
    Available,
    /// A lock is held.
    Held {
        /// The holding session.
        held_by: String,
        /// The holder's worktree.
        worktree: String,
        /// Whether the holder is the caller.
        is_mine: bool,
        /// Original acquisition time.
        acquired_at: DateTime<Utc>,
        /// Current expiry.
        expires_at: DateTime<Utc>,
    },
}

/// One entry returned by [`LockManager::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// The canonical storage key.
    pub key: String,
    /// The scope segment of the key, i.e. `key` with the `<namespace>:locks:`
    /// prefix stripped (e.g. `"issue:1"`).
    pub name: String,
    /// The holding session.
    pub session_id: String,
    /// The holder's worktree.
    pub worktree: String,
    /// Original acquisition time.
    pub acquired_at: DateTime<Utc>,
    /// Current expiry.
    pub expires_at: DateTime<Utc>,
    /// Whether the caller passed to `list` is the holder.
    pub is_mine: bool,
}

/// Mediates exclusive locks over named resources.
pub struct LockManager {
    kvg: Arc<dyn KeyValueGateway>,
    clock: Arc<dyn Clock>,
    namespace: String,
    default_ttl_secs: i64,
    max_ttl_secs: i64,
}

impl LockManager {
    /// Build a `LockManager` over `kvg`, using `namespace` as the `<root>`
    /// prefix and clamping caller-supplied TTLs to `[1, max_ttl_secs]`.
    #[must_use]
    pub fn new(
        kvg: Arc<dyn KeyValueGateway>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
        default_ttl_secs: i64,
        max_ttl_secs: i64,
    ) -> Self {
        Self {
            kvg,
            clock,
            namespace: namespace.into(),
            default_ttl_secs,
            max_ttl_secs,
        }
    }

    fn resolve_key(&self, token: &LockToken, branch: &BranchContext) -> Result<String> {
        naming::resolve_token(&self.namespace, token, branch)
    }

    /// Acquire (or idempotently re-acquire/extend) a lock.
    ///
    /// Re-acquisition by the same owner always succeeds and extends the
    /// TTL — it is not a race. A brand new acquisition is attempted with a
    /// single atomic `put_if_absent`; if that loses a race to a concurrent
    /// acquirer, the record is re-read once to distinguish "someone else
    /// already held it" (`lock_held`) from "we lost the race to a
    /// simultaneous acquirer" (`race_condition`).
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG and
    /// `Error::InvalidArgument` if `token` is `"work"` against an
    /// unresolvable branch context.
    pub async fn acquire(
        &self,
        token: &LockToken,
        owner: &SessionId,
        worktree: &WorktreePath,
        branch: &BranchContext,
        ttl_secs: Option<i64>,
    ) -> Result<AcquireOutcome> {
        let key = self.resolve_key(token, branch)?;
        let ttl = ttl_secs
            .unwrap_or(self.default_ttl_secs)
            .clamp(1, self.max_ttl_secs);
        let now = self.clock.now();

        if let Some(raw) = self.kvg.get(&key).await? {
            let existing: LockRecord = serde_json::from_str(&raw)?;
            if existing.session_id == owner.as_str() {
                let expires_at = now + chrono::Duration::seconds(ttl);
                let record = LockRecord {
                    session_id: owner.as_str().to_string(),
                    worktree: worktree.as_str().to_string(),
                    acquired_at: existing.acquired_at,
                    expires_at,
                };
                self.kvg.put(&key, &serde_json::to_string(&record)?, Some(ttl)).await?;
                return Ok(AcquireOutcome::Acquired {
                    lock_key: key,
                    extended: true,
                    expires_at,
                });
            }
            return Ok(AcquireOutcome::Denied {
                reason: DenyReason::LockHeld,
                held_by: existing.session_id,
                worktree: existing.worktree,
                acquired_at: existing.acquired_at,
                expires_at: existing.expires_at,
            });
        }

        let expires_at = now + chrono::Duration::seconds(ttl);
        let record = LockRecord {
            session_id: owner.as_str().to_string(),
            worktree: worktree.as_str().to_string(),
            acquired_at: now,
            expires_at,
        };
        let acquired = self
            .kvg
            .put_if_absent(&key, &serde_json::to_string(&record)?, ttl)
            .await?;
        if acquired {
            tracing::info!(lock_key = %key, owner = %owner, "lock acquired");
            return Ok(AcquireOutcome::Acquired {
                lock_key: key,
                extended: false,
                expires_at,
            });
        }

        match self.kvg.get(&key).await? {
            Some(raw) => {
                let existing: LockRecord = serde_json::from_str(&raw)?;
                Ok(AcquireOutcome::Denied {
                    reason: DenyReason::RaceLost,
                    held_by: existing.session_id,
                    worktree: existing.worktree,
                    acquired_at: existing.acquired_at,
                    expires_at: existing.expires_at,
                })
            }
            None => Ok(AcquireOutcome::Denied {
                reason: DenyReason::RaceLost,
                held_by: "unknown".to_string(),
                worktree: String::new(),
                acquired_at: now,
                expires_at: now,
            }),
        }
    }

    /// Release a lock held by `owner`.
    ///
    /// Implemented as read-then-delete, not compare-and-delete (Open
    /// Question resolution, see `DESIGN.md`): there is a benign window
    /// between the read and the delete where the lock could expire and be
    /// re-acquired by someone else, whose lock this call would then delete.
    /// Accepted per spec.md §9 as the default; a backend supporting
    /// atomic delete-if-equals could close it.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn release(
        &self,
        token: &LockToken,
        owner: &SessionId,
        branch: &BranchContext,
    ) -> Result<ReleaseOutcome> {
        let key = self.resolve_key(token, branch)?;
        match self.kvg.get(&key).await? {
            None => Ok(ReleaseOutcome::NotFound),
            Some(raw) => {
                let existing: LockRecord = serde_json::from_str(&raw)?;
                if existing.session_id != owner.as_str() {
                    return Ok(ReleaseOutcome::NotOwner {
                        held_by: existing.session_id,
                    });
                }
                self.kvg.delete(&key).await?;
                tracing::info!(lock_key = %key, owner = %owner, "lock released");
                Ok(ReleaseOutcome::Released { lock_key: key })
            }
        }
    }

    /// Inspect a lock's current state without acquiring or releasing it.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn check(
        &self,
        token: &LockToken,
        caller: Option<&SessionId>,
        branch: &BranchContext,
    ) -> Result<CheckOutcome> {
        let key = self.resolve_key(token, branch)?;
        match self.kvg.get(&key).await? {
            None => Ok(CheckOutcome::Available),
            Some(raw) => {
                let existing: LockRecord = serde_json::from_str(&raw)?;
                let is_mine = caller.is_some_and(|c| c.as_str() == existing.session_id);
                Ok(CheckOutcome::Held {
                    held_by: existing.session_id,
                    worktree: existing.worktree,
                    is_mine,
                    acquired_at: existing.acquired_at,
                    expires_at: existing.expires_at,
                })
            }
        }
    }

    /// List all locks whose scope segment matches `pattern` (a Redis-style
    /// glob, default `"*"`). Entries that fail to deserialize are skipped
    /// and logged at `debug`, not treated as a hard error for the whole
    /// call. `caller`, if given, populates each entry's `is_mine`.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn list(&self, pattern: &str, caller: Option<&SessionId>) -> Result<Vec<LockEntry>> {
        let scan_pattern = naming::lock_scan_pattern(&self.namespace, pattern);
        let keys = self.kvg.scan(&scan_pattern).await?;
        let prefix = format!("{}:locks:", self.namespace);
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.kvg.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<LockRecord>(&raw) {
                Ok(record) => {
                    let name = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                    let is_mine = caller.is_some_and(|c| c.as_str() == record.session_id);
                    entries.push(LockEntry {
                        key,
                        name,
                        session_id: record.session_id,
                        worktree: record.worktree,
                        acquired_at: record.acquired_at,
                        expires_at: record.expires_at,
                        is_mine,
                    });
                }
                Err(err) => {
                    tracing::debug!(lock_key = %key, error = %err, "skipping unparsable lock record");
                }
            }
        }
        Ok(entries)
    }

    /// Release every lock currently owned by `owner`, used by the Session
    /// Manager's `unregister` to cascade-release before deleting session
    /// state. Returns the keys that were released.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn release_owned(&self, owner: &SessionId) -> Result<Vec<String>> {
        let all = self.list("*", None).await?;
        let mut released = Vec::new();
        for entry in all {
            if entry.session_id == owner.as_str() {
                self.kvg.delete(&entry.key).await?;
                released.push(entry.key);
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::kvg::InMemoryGateway;

    fn manager() -> (LockManager, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let kvg = Arc::new(InMemoryGateway::new(clock.clone()));
        let manager = LockManager::new(kvg, clock.clone(), "claude", 300, 3600);
        (manager, clock)
    }

    fn session(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    fn worktree() -> WorktreePath {
        WorktreePath::new("/tmp/work")
    }

    #[tokio::test]
    async fn basic_mutex_second_caller_denied() {
        let (manager, _clock) = manager();
        let token = LockToken::new("resource-a").unwrap();

        let first = manager
            .acquire(&token, &session("s1"), &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        assert!(matches!(first, AcquireOutcome::Acquired { extended: false, .. }));

        let second = manager
            .acquire(&token, &session("s2"), &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        match second {
            AcquireOutcome::Denied { reason, held_by, .. } => {
                assert_eq!(reason, DenyReason::LockHeld);
                assert_eq!(held_by, "s1");
            }
            AcquireOutcome::Acquired { .. } => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn owner_reacquire_extends_without_denial() {
        let (manager, clock) = manager();
        let token = LockToken::new("resource-a").unwrap();
        let owner = session("s1");

        manager
            .acquire(&token, &owner, &worktree(), &BranchContext::Unknown, Some(10))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(5));
        let second = manager
            .acquire(&token, &owner, &worktree(), &BranchContext::Unknown, Some(10))
            .await
            .unwrap();
        assert!(matches!(second, AcquireOutcome::Acquired { extended: true, .. }));
    }

    #[tokio::test]
    async fn release_then_check_shows_available() {
        let (manager, _clock) = manager();
        let token = LockToken::new("resource-a").unwrap();
        let owner = session("s1");
        manager
            .acquire(&token, &owner, &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        let released = manager
            .release(&token, &owner, &BranchContext::Unknown)
            .await
            .unwrap();
        assert!(matches!(released, ReleaseOutcome::Released { .. }));
        let check = manager.check(&token, None, &BranchContext::Unknown).await.unwrap();
        assert_eq!(check, CheckOutcome::Available);
    }

    #[tokio::test]
    async fn release_by_non_owner_is_not_owner() {
        let (manager, _clock) = manager();
        let token = LockToken::new("resource-a").unwrap();
        manager
            .acquire(&token, &session("s1"), &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        let result = manager
            .release(&token, &session("s2"), &BranchContext::Unknown)
            .await
            .unwrap();
        assert_eq!(
            result,
            ReleaseOutcome::NotOwner {
                held_by: "s1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn release_nonexistent_lock_is_not_found() {
        let (manager, _clock) = manager();
        let token = LockToken::new("never-acquired").unwrap();
        let result = manager
            .release(&token, &session("s1"), &BranchContext::Unknown)
            .await
            .unwrap();
        assert_eq!(result, ReleaseOutcome::NotFound);
    }

    #[tokio::test]
    async fn list_returns_pattern_matched_locks() {
        let (manager, _clock) = manager();
        manager
            .acquire(
                &LockToken::new("issue:1").unwrap(),
                &session("s1"),
                &worktree(),
                &BranchContext::Unknown,
                None,
            )
            .await
            .unwrap();
        manager
            .acquire(
                &LockToken::new("issue:2").unwrap(),
                &session("s2"),
                &worktree(),
                &BranchContext::Unknown,
                None,
            )
            .await
            .unwrap();
        let all = manager.list("issue:*", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn branch_auto_detect_switches_locked_key() {
        let (manager, _clock) = manager();
        let work = LockToken::new("work").unwrap();
        let owner = session("s1");

        let on_issue_7 = manager
            .acquire(
                &work,
                &owner,
                &worktree(),
                &BranchContext::Issue(7),
                None,
            )
            .await
            .unwrap();
        let AcquireOutcome::Acquired { lock_key: key_a, .. } = on_issue_7 else {
            panic!("expected acquisition")
        };
        assert_eq!(key_a, "claude:locks:issue:7");

        let on_issue_8 = manager
            .acquire(
                &work,
                &owner,
                &worktree(),
                &BranchContext::Issue(8),
                None,
            )
            .await
            .unwrap();
        let AcquireOutcome::Acquired { lock_key: key_b, .. } = on_issue_8 else {
            panic!("expected acquisition")
        };
        assert_eq!(key_b, "claude:locks:issue:8");
        assert_ne!(key_a, key_b);

        // The first key is untouched by switching to the second.
        let still_there = manager
            .check(&LockToken::new("issue:7").unwrap(), None, &BranchContext::Unknown)
            .await
            .unwrap();
        assert!(matches!(still_there, CheckOutcome::Held { .. }));
    }

    #[tokio::test]
    async fn release_owned_cascades_across_multiple_locks() {
        let (manager, _clock) = manager();
        let owner = session("s1");
        manager
            .acquire(&LockToken::new("a").unwrap(), &owner, &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        manager
            .acquire(&LockToken::new("b").unwrap(), &owner, &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();
        manager
            .acquire(
                &LockToken::new("c").unwrap(),
                &session("other"),
                &worktree(),
                &BranchContext::Unknown,
                None,
            )
            .await
            .unwrap();

        let released = manager.release_owned(&owner).await.unwrap();
        assert_eq!(released.len(), 2);

        let remaining = manager.list("*", None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, "other");
    }

    #[tokio::test]
    async fn list_populates_name_and_is_mine() {
        let (manager, _clock) = manager();
        let owner = session("s1");
        manager
            .acquire(&LockToken::new("issue:1").unwrap(), &owner, &worktree(), &BranchContext::Unknown, None)
            .await
            .unwrap();

        let as_owner = manager.list("*", Some(&owner)).await.unwrap();
        assert_eq!(as_owner[0].name, "issue:1");
        assert!(as_owner[0].is_mine);

        let as_other = manager.list("*", Some(&session("s2"))).await.unwrap();
        assert!(!as_other[0].is_mine);
    }
}
