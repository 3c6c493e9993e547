//! Coordination service CLI/RPC shim.
//!
//! Binary name: `coord-server`. Exposes one subcommand per RPC operation,
//! each dispatching through [`rpc::dispatch`] and printing the resulting
//! wire-shape JSON to stdout. Stands in for the transport layer the core
//! itself stays agnostic to.

mod rpc;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination_core::branch::GitBranchProvider;
use coordination_core::clock::SystemClock;
use coordination_core::coordination::{LockManager, SessionManager};
use coordination_core::domain_types::{SessionId, WorktreePath};
use coordination_core::kvg::RedisGateway;
use coordination_core::{Config, SessionContext};

use rpc::{RpcRequest, Service};

#[derive(Debug, Parser)]
#[command(name = "coord-server", version, about = "Lock and session coordination over a key-value backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Acquire (or idempotently extend) a lock.
    AcquireLock {
        /// Lock name, a canonical `scope:name` key, or `"work"` to auto-detect from branch.
        lock_name: String,
        /// TTL in seconds; defaults to the configured default.
        #[arg(long)]
        timeout_seconds: Option<i64>,
    },
    /// Release a lock you hold.
    ReleaseLock {
        /// Lock name to release.
        lock_name: String,
    },
    /// Inspect a lock without acquiring it.
    CheckLock {
        /// Lock name to inspect.
        lock_name: String,
    },
    /// List locks matching a pattern.
    ListLocks {
        /// Glob pattern over the scope segment, default `*`.
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Register this session.
    RegisterSession,
    /// Refresh this session's heartbeat.
    Heartbeat,
    /// Report the liveness tier of every registered session.
    SessionStatus,
    /// Report backend connectivity and server identity.
    HealthCheck,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    let kvg = Arc::new(
        RedisGateway::connect(&config.backend_url, config.kvg_call_timeout_ms)
            .await
            .context("failed to connect to backend")?,
    );
    let clock = Arc::new(SystemClock);
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

    let worktree = WorktreePath::current_dir();
    let ctx = SessionContext::new(
        SessionId::from_env_or_pid("COORD_SESSION_ID", "coord"),
        worktree.clone(),
        clock,
        Arc::new(GitBranchProvider::new(worktree.as_str())),
    );

    let request = match cli.command {
        Command::AcquireLock {
            lock_name,
            timeout_seconds,
        } => RpcRequest::AcquireLock {
            lock_name,
            timeout_seconds,
        },
        Command::ReleaseLock { lock_name } => RpcRequest::ReleaseLock { lock_name },
        Command::CheckLock { lock_name } => RpcRequest::CheckLock { lock_name },
        Command::ListLocks { pattern } => RpcRequest::ListLocks { pattern },
        Command::RegisterSession => RpcRequest::RegisterSession { metadata: None },
        Command::Heartbeat => RpcRequest::Heartbeat,
        Command::SessionStatus => RpcRequest::SessionStatus,
        Command::HealthCheck => RpcRequest::HealthCheck,
    };

    let response = rpc::dispatch(&service, &ctx, request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
