//! Session Manager: register/heartbeat/status/unregister, grounded on the
//! teacher's `AgentRegistry` (register/heartbeat/get_active/unregister)
//! with the staleness tiers and cascade-release behavior from the
//! original `coordination.py`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::{Display, EnumString};

use super::locks::LockManager;
use super::records::SessionRecord;
use crate::clock::Clock;
use crate::config::Config;
use crate::domain_types::{SessionId, WorktreePath};
use crate::error::Result;
use crate::kvg::KeyValueGateway;
use crate::naming;

/// Liveness tier derived from heartbeat age at read time. Never persisted;
/// recomputed on every `status` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StalenessTier {
    /// Heartbeat younger than `active_threshold_secs`.
    Active,
    /// Heartbeat between the active and idle thresholds.
    Idle,
    /// Heartbeat between the idle and stale thresholds.
    Stale,
    /// Heartbeat between the stale and abandoned thresholds (still the
    /// oldest reported tier; age beyond this is still `Abandoned`).
    Abandoned,
    /// A session record exists but its heartbeat key has expired or was
    /// never written.
    NoHeartbeat,
}

/// One entry returned by [`SessionManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatusEntry {
    /// The session's id.
    pub session_id: String,
    /// The worktree it registered from.
    pub worktree: String,
    /// When it registered.
    pub started_at: DateTime<Utc>,
    /// Seconds since the last heartbeat, if one exists.
    pub heartbeat_age_secs: Option<i64>,
    /// The computed liveness tier.
    pub tier: StalenessTier,
}

/// Outcome of [`SessionManager::heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The heartbeat key was refreshed.
    Recorded,
    /// No session was registered under this id; the heartbeat key is still
    /// written (matching the original's best-effort behavior), but the
    /// accompanying session-record refresh is skipped.
    NoSessionRecord,
}

/// Outcome of [`SessionManager::unregister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterOutcome {
    /// Keys of locks that were cascade-released before the session record
    /// was deleted.
    pub released_locks: Vec<String>,
}

/// Registers, heartbeats, and reports on coordination sessions.
pub struct SessionManager {
    kvg: Arc<dyn KeyValueGateway>,
    clock: Arc<dyn Clock>,
    locks: Arc<LockManager>,
    namespace: String,
    heartbeat_ttl_secs: i64,
    active_threshold_secs: i64,
    idle_threshold_secs: i64,
    stale_threshold_secs: i64,
    abandoned_threshold_secs: i64,
}

impl SessionManager {
    /// Build a `SessionManager` sharing `kvg`/`clock` with a `LockManager`
    /// so `unregister` can cascade-release.
    #[must_use]
    pub fn new(
        kvg: Arc<dyn KeyValueGateway>,
        clock: Arc<dyn Clock>,
        locks: Arc<LockManager>,
        config: &Config,
    ) -> Self {
        Self {
            kvg,
            clock,
            locks,
            namespace: config.lock_namespace.clone(),
            heartbeat_ttl_secs: config.heartbeat_ttl_secs,
            active_threshold_secs: config.active_threshold_secs,
            idle_threshold_secs: config.idle_threshold_secs,
            stale_threshold_secs: config.stale_threshold_secs,
            abandoned_threshold_secs: config.abandoned_threshold_secs,
        }
    }

    /// Register a session, writing both the (TTL-less) session record and
    /// a fresh heartbeat key.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn register(
        &self,
        session_id: &SessionId,
        worktree: &WorktreePath,
        metadata: Value,
    ) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        let record = SessionRecord {
            session_id: session_id.as_str().to_string(),
            worktree: worktree.as_str().to_string(),
            started_at: now,
            metadata,
            status: "active".to_string(),
            last_heartbeat: Some(now),
        };
        let session_key = naming::session_key(&self.namespace, session_id.as_str());
        let heartbeat_key = naming::heartbeat_key(&self.namespace, session_id.as_str());
        self.kvg
            .put(&session_key, &serde_json::to_string(&record)?, None)
            .await?;
        self.kvg
            .put(&heartbeat_key, &now.to_rfc3339(), Some(self.heartbeat_ttl_secs))
            .await?;
        tracing::info!(session_id = %session_id, "session registered");
        Ok(now)
    }

    /// Refresh a session's heartbeat key. Best-effort: if no session
    /// record exists, the heartbeat is still written (matching the
    /// original, which logs and continues rather than failing the call).
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn heartbeat(&self, session_id: &SessionId) -> Result<HeartbeatOutcome> {
        let now = self.clock.now();
        let heartbeat_key = naming::heartbeat_key(&self.namespace, session_id.as_str());
        self.kvg
            .put(&heartbeat_key, &now.to_rfc3339(), Some(self.heartbeat_ttl_secs))
            .await?;

        let session_key = naming::session_key(&self.namespace, session_id.as_str());
        match self.kvg.get(&session_key).await? {
            Some(raw) => {
                if let Ok(mut record) = serde_json::from_str::<SessionRecord>(&raw) {
                    record.status = "active".to_string();
                    record.last_heartbeat = Some(now);
                    self.kvg
                        .put(&session_key, &serde_json::to_string(&record)?, None)
                        .await?;
                }
                Ok(HeartbeatOutcome::Recorded)
            }
            None => {
                tracing::debug!(session_id = %session_id, "heartbeat with no session record");
                Ok(HeartbeatOutcome::NoSessionRecord)
            }
        }
    }

    fn classify(&self, heartbeat_age_secs: Option<i64>) -> StalenessTier {
        let Some(age) = heartbeat_age_secs else {
            return StalenessTier::NoHeartbeat;
        };
        if age < self.active_threshold_secs {
            StalenessTier::Active
        } else if age < self.idle_threshold_secs {
            StalenessTier::Idle
        } else if age < self.stale_threshold_secs {
            StalenessTier::Stale
        } else {
            // Covers both the "stale..abandoned" window and anything
            // older: the spec reports one terminal tier past the stale
            // threshold rather than an unbounded number of tiers.
            if age >= self.abandoned_threshold_secs {
                tracing::trace!(age_secs = age, "session heartbeat far past the abandoned threshold");
            }
            StalenessTier::Abandoned
        }
    }

    /// Report every registered session's liveness tier.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn status(&self) -> Result<Vec<SessionStatusEntry>> {
        let pattern = format!("{}:sessions:*", self.namespace);
        let keys = self.kvg.scan(&pattern).await?;
        let now = self.clock.now();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.kvg.get(&key).await? else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<SessionRecord>(&raw) else {
                tracing::debug!(session_key = %key, "skipping unparsable session record");
                continue;
            };
            let heartbeat_key = naming::heartbeat_key(&self.namespace, &record.session_id);
            let heartbeat_age_secs = match self.kvg.get(&heartbeat_key).await? {
                Some(raw_heartbeat) => DateTime::parse_from_rfc3339(&raw_heartbeat)
                    .ok()
                    .map(|ts| (now - ts.with_timezone(&Utc)).num_seconds()),
                None => None,
            };
            entries.push(SessionStatusEntry {
                session_id: record.session_id,
                worktree: record.worktree,
                started_at: record.started_at,
                heartbeat_age_secs,
                tier: self.classify(heartbeat_age_secs),
            });
        }
        Ok(entries)
    }

    /// Remove a session: cascade-release every lock it owns, then delete
    /// its session and heartbeat records, in that order.
    ///
    /// # Errors
    /// Propagates `Error::BackendUnavailable` from the KVG.
    pub async fn unregister(&self, session_id: &SessionId) -> Result<UnregisterOutcome> {
        let released_locks = self.locks.release_owned(session_id).await?;

        let session_key = naming::session_key(&self.namespace, session_id.as_str());
        let heartbeat_key = naming::heartbeat_key(&self.namespace, session_id.as_str());
        self.kvg.delete(&session_key).await?;
        self.kvg.delete(&heartbeat_key).await?;

        tracing::info!(
            session_id = %session_id,
            released = released_locks.len(),
            "session unregistered"
        );
        Ok(UnregisterOutcome { released_locks })
    }
}
