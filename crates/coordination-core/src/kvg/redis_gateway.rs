//! Redis-backed [`KeyValueGateway`], grounded on the original
//! implementation's `RedisClient` (`redis.asyncio.ConnectionPool`,
//! lazily created, shared across calls).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{KeyValueGateway, ServerInfo};
use crate::error::{Error, Result};

/// A Redis-backed gateway. Holds a single `ConnectionManager`, which
/// multiplexes and auto-reconnects under the hood — there's no explicit
/// pool to exhaust or leak.
pub struct RedisGateway {
    connection: ConnectionManager,
    call_timeout: Duration,
}

impl RedisGateway {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`), applying
    /// `call_timeout_ms` to every subsequent operation.
    ///
    /// # Errors
    /// Returns `Error::BackendUnavailable` if the initial connection fails.
    pub async fn connect(url: &str, call_timeout_ms: u64) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::BackendUnavailable(format!("invalid backend url: {e}")))?;
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection,
            call_timeout: Duration::from_millis(call_timeout_ms),
        })
    }

    /// Run `fut` under this gateway's per-call timeout, turning an elapsed
    /// deadline into `Error::BackendUnavailable`.
    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| Error::BackendUnavailable(format!("backend call timed out after {:?}", self.call_timeout)))?
    }
}

#[async_trait]
impl KeyValueGateway for RedisGateway {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: i64) -> Result<bool> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let opts = redis::SetOptions::default()
                .conditional_set(redis::ExistenceCheck::NX)
                .with_expiration(redis::SetExpiry::EX(ttl_secs.max(1) as u64));
            let result: Option<String> = conn.set_options(key, value, opts).await?;
            Ok(result.is_some())
        })
        .await
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            match ttl_secs {
                Some(ttl) => {
                    let _: () = conn.set_ex(key, value, ttl.max(1) as u64).await?;
                }
                None => {
                    let _: () = conn.set(key, value).await?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let _: i64 = conn.expire(key, ttl_secs.max(1)).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let _: i64 = conn.del(key).await?;
            Ok(())
        })
        .await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(200)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next_cursor == 0 {
                    break;
                }
                cursor = next_cursor;
            }
            Ok(keys)
        })
        .await
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let response: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(response == "PONG")
        })
        .await
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let mut conn = self.connection.clone();
        self.with_timeout(async move {
            let raw: String = redis::cmd("INFO")
                .arg("server")
                .query_async(&mut conn)
                .await?;
            let mut version = "unknown".to_string();
            let mut uptime_seconds = 0u64;
            for line in raw.lines() {
                if let Some(value) = line.strip_prefix("redis_version:") {
                    version = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("uptime_in_seconds:") {
                    uptime_seconds = value.trim().parse().unwrap_or(0);
                }
            }
            Ok(ServerInfo {
                version,
                uptime_seconds,
            })
        })
        .await
    }
}
