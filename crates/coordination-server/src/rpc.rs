//! Typed RPC surface, dispatched independently of any particular
//! transport. A future transport (HTTP, stdio JSON-RPC, MCP) wraps
//! [`dispatch`]; it never needs to be rewritten to add one.
//!
//! Wire shapes mirror the original server's tool surface
//! (`acquire_lock`, `release_lock`, `check_lock`, `list_locks`,
//! `register_session`, `heartbeat`, `session_status`, `health_check`),
//! flattening each operation's tagged outcome to a discriminated JSON map
//! at this boundary, per design note 9.

use std::sync::Arc;

use coordination_core::coordination::{
    AcquireOutcome, CheckOutcome, DenyReason, LockManager, ReleaseOutcome, SessionManager,
    StalenessTier,
};
use coordination_core::domain_types::LockToken;
use coordination_core::kvg::KeyValueGateway;
use coordination_core::{Config, Result, SessionContext};
use serde::Deserialize;
use serde_json::{json, Value};

/// One call into the coordination core, transport-agnostic.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RpcRequest {
    /// `acquire_lock(lock_name, timeout_seconds)`.
    AcquireLock {
        /// The lock name/token to acquire.
        lock_name: String,
        /// Requested TTL in seconds; `None` uses the configured default.
        #[serde(default)]
        timeout_seconds: Option<i64>,
    },
    /// `release_lock(lock_name)`.
    ReleaseLock {
        /// The lock name/token to release.
        lock_name: String,
    },
    /// `check_lock(lock_name)`.
    CheckLock {
        /// The lock name/token to inspect.
        lock_name: String,
    },
    /// `list_locks(pattern)`.
    ListLocks {
        /// A scope-segment glob, default `"*"`.
        #[serde(default)]
        pattern: Option<String>,
    },
    /// `register_session(metadata)`.
    RegisterSession {
        /// Free-form metadata to attach to the session record.
        #[serde(default)]
        metadata: Option<Value>,
    },
    /// `heartbeat()`.
    Heartbeat,
    /// `session_status()`.
    SessionStatus,
    /// `health_check()`.
    HealthCheck,
}

/// The coordination core's dependencies, bundled for a server process.
pub struct Service {
    /// Loaded, validated configuration.
    pub config: Config,
    /// The backend gateway.
    pub kvg: Arc<dyn KeyValueGateway>,
    /// The lock manager.
    pub locks: Arc<LockManager>,
    /// The session manager.
    pub sessions: Arc<SessionManager>,
}

/// Run one [`RpcRequest`] against `service` on behalf of `ctx`, returning
/// the wire-shaped JSON response.
///
/// # Errors
/// Propagates `Error::BackendUnavailable` and `Error::InvalidArgument` from
/// the underlying core calls.
pub async fn dispatch(service: &Service, ctx: &SessionContext, request: RpcRequest) -> Result<Value> {
    match request {
        RpcRequest::AcquireLock {
            lock_name,
            timeout_seconds,
        } => acquire_lock(service, ctx, &lock_name, timeout_seconds).await,
        RpcRequest::ReleaseLock { lock_name } => release_lock(service, ctx, &lock_name).await,
        RpcRequest::CheckLock { lock_name } => check_lock(service, ctx, &lock_name).await,
        RpcRequest::ListLocks { pattern } => {
            list_locks(service, ctx, pattern.as_deref().unwrap_or("*")).await
        }
        RpcRequest::RegisterSession { metadata } => {
            register_session(service, ctx, metadata.unwrap_or(Value::Null)).await
        }
        RpcRequest::Heartbeat => heartbeat(service, ctx).await,
        RpcRequest::SessionStatus => session_status(service, ctx).await,
        RpcRequest::HealthCheck => health_check(service, ctx).await,
    }
}

async fn acquire_lock(
    service: &Service,
    ctx: &SessionContext,
    lock_name: &str,
    timeout_seconds: Option<i64>,
) -> Result<Value> {
    let token = LockToken::new(lock_name)?;
    let branch = ctx.branch_context();
    let outcome = service
        .locks
        .acquire(&token, &ctx.session_id, &ctx.worktree, &branch, timeout_seconds)
        .await?;
    Ok(match outcome {
        AcquireOutcome::Acquired {
            lock_key,
            extended,
            expires_at,
        } => json!({
            "success": true,
            "lock_name": lock_name,
            "key": lock_key,
            "extended": extended,
            "expires_at": expires_at.to_rfc3339(),
        }),
        AcquireOutcome::Denied {
            reason,
            held_by,
            worktree,
            acquired_at,
            expires_at,
        } => json!({
            "success": false,
            "reason": deny_reason_str(&reason),
            "holder": held_by,
            "worktree": worktree,
            "acquired_at": acquired_at.to_rfc3339(),
            "expires_at": expires_at.to_rfc3339(),
        }),
    })
}

fn deny_reason_str(reason: &DenyReason) -> &'static str {
    match reason {
        DenyReason::LockHeld => "lock_held",
        DenyReason::RaceLost => "race_condition",
    }
}

async fn release_lock(service: &Service, ctx: &SessionContext, lock_name: &str) -> Result<Value> {
    let token = LockToken::new(lock_name)?;
    let branch = ctx.branch_context();
    let outcome = service.locks.release(&token, &ctx.session_id, &branch).await?;
    Ok(match outcome {
        ReleaseOutcome::Released { lock_key } => json!({
            "success": true,
            "lock_name": lock_key,
        }),
        ReleaseOutcome::NotFound => json!({
            "success": false,
            "reason": "not_found",
        }),
        ReleaseOutcome::NotOwner { held_by } => json!({
            "success": false,
            "reason": "not_owner",
            "holder": held_by,
        }),
    })
}

async fn check_lock(service: &Service, ctx: &SessionContext, lock_name: &str) -> Result<Value> {
    let token = LockToken::new(lock_name)?;
    let branch = ctx.branch_context();
    let outcome = service
        .locks
        .check(&token, Some(&ctx.session_id), &branch)
        .await?;
    Ok(match outcome {
        CheckOutcome::Available => json!({ "available": true, "lock_name": lock_name }),
        CheckOutcome::Held {
            held_by,
            worktree,
            is_mine,
            acquired_at,
            expires_at,
        } => json!({
            "available": false,
            "lock_name": lock_name,
            "holder": held_by,
            "is_mine": is_mine,
            "worktree": worktree,
            "acquired_at": acquired_at.to_rfc3339(),
            "expires_at": expires_at.to_rfc3339(),
        }),
    })
}

async fn list_locks(service: &Service, ctx: &SessionContext, pattern: &str) -> Result<Value> {
    let entries = service.locks.list(pattern, Some(&ctx.session_id)).await?;
    let locks: Vec<Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "name": entry.name,
                "held_by": entry.session_id,
                "is_mine": entry.is_mine,
                "worktree": entry.worktree,
                "acquired_at": entry.acquired_at.to_rfc3339(),
                "expires_at": entry.expires_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(json!({
        "count": locks.len(),
        "locks": locks,
        "pattern": pattern,
    }))
}

async fn register_session(service: &Service, ctx: &SessionContext, metadata: Value) -> Result<Value> {
    let registered_at = service
        .sessions
        .register(&ctx.session_id, &ctx.worktree, metadata)
        .await?;
    Ok(json!({
        "success": true,
        "session_id": ctx.session_id.as_str(),
        "registered_at": registered_at.to_rfc3339(),
    }))
}

async fn heartbeat(service: &Service, ctx: &SessionContext) -> Result<Value> {
    service.sessions.heartbeat(&ctx.session_id).await?;
    Ok(json!({
        "success": true,
        "session_id": ctx.session_id.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn session_status(service: &Service, ctx: &SessionContext) -> Result<Value> {
    let sessions = service.sessions.status().await?;
    let entries: Vec<Value> = sessions
        .iter()
        .map(|entry| {
            json!({
                "session_id": entry.session_id,
                "worktree": entry.worktree,
                "started_at": entry.started_at.to_rfc3339(),
                "heartbeat_age_seconds": entry.heartbeat_age_secs,
                "status": tier_str(entry.tier),
            })
        })
        .collect();
    Ok(json!({
        "my_session": ctx.session_id.as_str(),
        "session_count": entries.len(),
        "sessions": entries,
    }))
}

fn tier_str(tier: StalenessTier) -> String {
    tier.to_string()
}

async fn health_check(service: &Service, ctx: &SessionContext) -> Result<Value> {
    let ping_ok = service.kvg.ping().await.unwrap_or(false);
    let info = service.kvg.server_info().await.ok();
    Ok(json!({
        "server": service.config.server_name,
        "session_id": ctx.session_id.as_str(),
        "backend": {
            "connected": ping_ok,
            "version": info.as_ref().map(|i| i.version.clone()),
            "uptime_seconds": info.as_ref().map(|i| i.uptime_seconds),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination_core::branch::FixedBranchProvider;
    use coordination_core::clock::FakeClock;
    use coordination_core::domain_types::{SessionId, WorktreePath};
    use coordination_core::kvg::InMemoryGateway;
    use std::sync::Arc;

    fn service_and_ctx() -> (Service, SessionContext) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let config = Config::default();
        let kvg: Arc<dyn KeyValueGateway> = Arc::new(InMemoryGateway::new(clock.clone()));
        let locks = Arc::new(LockManager::new(
            kvg.clone(),
            clock.clone(),
            &config.lock_namespace,
            config.default_lock_timeout_secs,
            config.max_lock_timeout_secs,
        ));
        let sessions = Arc::new(SessionManager::new(kvg.clone(), clock.clone(), locks.clone(), &config));
        let service = Service {
            config,
            kvg,
            locks,
            sessions,
        };
        let ctx = SessionContext::new(
            SessionId::new("s1").unwrap(),
            WorktreePath::new("/tmp"),
            clock,
            Arc::new(FixedBranchProvider::none()),
        );
        (service, ctx)
    }

    #[tokio::test]
    async fn acquire_then_check_round_trips_through_dispatch() {
        let (service, ctx) = service_and_ctx();
        let acquired = dispatch(
            &service,
            &ctx,
            RpcRequest::AcquireLock {
                lock_name: "db".into(),
                timeout_seconds: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(acquired["success"], json!(true));

        let checked = dispatch(
            &service,
            &ctx,
            RpcRequest::CheckLock {
                lock_name: "db".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(checked["available"], json!(false));
        assert_eq!(checked["is_mine"], json!(true));
        assert_eq!(checked["lock_name"], json!("db"));
    }

    #[tokio::test]
    async fn acquire_reports_lock_name_and_key_separately() {
        let (service, ctx) = service_and_ctx();
        let acquired = dispatch(
            &service,
            &ctx,
            RpcRequest::AcquireLock {
                lock_name: "pytest".into(),
                timeout_seconds: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(acquired["lock_name"], json!("pytest"));
        assert_eq!(acquired["key"], json!("claude:locks:resource:pytest"));
    }

    #[tokio::test]
    async fn denied_acquire_reports_holder() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let config = Config::default();
        let kvg: Arc<dyn KeyValueGateway> = Arc::new(InMemoryGateway::new(clock.clone()));
        let locks = Arc::new(LockManager::new(
            kvg.clone(),
            clock.clone(),
            &config.lock_namespace,
            config.default_lock_timeout_secs,
            config.max_lock_timeout_secs,
        ));
        let sessions = Arc::new(SessionManager::new(kvg.clone(), clock.clone(), locks.clone(), &config));
        let service = Service {
            config,
            kvg,
            locks,
            sessions,
        };
        let alice = SessionContext::new(
            SessionId::new("alice").unwrap(),
            WorktreePath::new("/tmp"),
            clock.clone(),
            Arc::new(FixedBranchProvider::none()),
        );
        let bob = SessionContext::new(
            SessionId::new("bob").unwrap(),
            WorktreePath::new("/tmp"),
            clock,
            Arc::new(FixedBranchProvider::none()),
        );

        dispatch(
            &service,
            &alice,
            RpcRequest::AcquireLock {
                lock_name: "pytest".into(),
                timeout_seconds: None,
            },
        )
        .await
        .unwrap();

        let denied = dispatch(
            &service,
            &bob,
            RpcRequest::AcquireLock {
                lock_name: "pytest".into(),
                timeout_seconds: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(denied["success"], json!(false));
        assert_eq!(denied["holder"], json!("alice"));
    }

    #[tokio::test]
    async fn list_locks_reports_name_and_is_mine() {
        let (service, ctx) = service_and_ctx();
        dispatch(
            &service,
            &ctx,
            RpcRequest::AcquireLock {
                lock_name: "issue:1".into(),
                timeout_seconds: None,
            },
        )
        .await
        .unwrap();

        let listed = dispatch(
            &service,
            &ctx,
            RpcRequest::ListLocks { pattern: None },
        )
        .await
        .unwrap();
        assert_eq!(listed["count"], json!(1));
        assert_eq!(listed["locks"][0]["name"], json!("issue:1"));
        assert_eq!(listed["locks"][0]["is_mine"], json!(true));
        assert_eq!(listed["locks"][0]["held_by"], json!("s1"));
    }

    #[tokio::test]
    async fn health_check_reports_backend_connected() {
        let (service, ctx) = service_and_ctx();
        let result = dispatch(&service, &ctx, RpcRequest::HealthCheck).await.unwrap();
        assert_eq!(result["backend"]["connected"], json!(true));
    }

    #[tokio::test]
    async fn register_and_status_round_trip() {
        let (service, ctx) = service_and_ctx();
        dispatch(&service, &ctx, RpcRequest::RegisterSession { metadata: None })
            .await
            .unwrap();
        dispatch(&service, &ctx, RpcRequest::Heartbeat).await.unwrap();
        let status = dispatch(&service, &ctx, RpcRequest::SessionStatus).await.unwrap();
        assert_eq!(status["session_count"], json!(1));
    }
}
