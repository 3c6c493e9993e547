//! Key-Value Gateway: the thin adapter over the backing store. Everything
//! above this trait speaks only in keys, values, and TTLs; nothing above
//! it knows the backend is Redis.

mod memory_gateway;
mod redis_gateway;

pub use memory_gateway::InMemoryGateway;
pub use redis_gateway::RedisGateway;

use async_trait::async_trait;

use crate::error::Result;

/// Metadata returned by `server_info`, mirroring the original's
/// `health_check` payload (`redis_version`, `uptime_seconds`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Backend version string, e.g. `"7.2.4"`.
    pub version: String,
    /// Seconds the backend process has been running.
    pub uptime_seconds: u64,
}

/// The KVG contract. Implementations own connection pooling; callers never
/// see a connection handle.
#[async_trait]
pub trait KeyValueGateway: Send + Sync {
    /// Fetch the value stored at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically store `value` at `key` with a TTL, only if `key` is
    /// currently absent. Returns `true` if the write happened.
    ///
    /// Must not transparently retry on an ambiguous failure (e.g. a
    /// connection reset mid-command) — an ambiguous failure surfaces as
    /// `Error::BackendUnavailable`, leaving the caller to decide whether to
    /// retry, exactly as spec.md requires.
    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: i64) -> Result<bool>;

    /// Unconditionally store `value` at `key`, overwriting any existing
    /// value. `ttl_secs` of `None` stores the key with no expiry (used for
    /// session records, which the spec leaves un-expiring).
    async fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()>;

    /// Refresh the TTL of an existing key without changing its value.
    /// A no-op (not an error) if `key` doesn't exist.
    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<()>;

    /// Remove `key`. Not an error if it doesn't exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Enumerate all keys matching `pattern`, via cursor-style iteration —
    /// never a single blocking full-keyspace scan.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Liveness probe.
    async fn ping(&self) -> Result<bool>;

    /// Backend version/uptime, for `health_check`.
    async fn server_info(&self) -> Result<ServerInfo>;
}
