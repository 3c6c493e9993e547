//! In-memory [`KeyValueGateway`], for tests and Redis-less development.
//! Honors the same TTL/atomicity contract as the real backend, gated by an
//! injected [`Clock`] rather than real sleeps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{KeyValueGateway, ServerInfo};
use crate::clock::Clock;
use crate::error::Result;

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// A `Mutex`-guarded `HashMap` standing in for a KV backend in tests.
pub struct InMemoryGateway {
    clock: Arc<dyn Clock>,
    store: Mutex<HashMap<String, Entry>>,
}

impl InMemoryGateway {
    /// Build an empty gateway driven by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            store: Mutex::new(HashMap::new()),
        }
    }

    fn is_live(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        entry.expires_at.map_or(true, |exp| exp > now)
    }
}

#[async_trait]
impl KeyValueGateway for InMemoryGateway {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut store = self.store.lock().expect("lock poisoned");
        match store.get(key) {
            Some(entry) if self.is_live(entry, now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                store.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: i64) -> Result<bool> {
        let now = self.clock.now();
        let mut store = self.store.lock().expect("lock poisoned");
        if let Some(existing) = store.get(key) {
            if self.is_live(existing, now) {
                return Ok(false);
            }
        }
        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + chrono::Duration::seconds(ttl_secs)),
            },
        );
        Ok(true)
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<()> {
        let now = self.clock.now();
        let mut store = self.store.lock().expect("lock poisoned");
        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_secs.map(|ttl| now + chrono::Duration::seconds(ttl)),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<()> {
        let now = self.clock.now();
        let mut store = self.store.lock().expect("lock poisoned");
        if let Some(entry) = store.get_mut(key) {
            entry.expires_at = Some(now + chrono::Duration::seconds(ttl_secs));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut store = self.store.lock().expect("lock poisoned");
        store.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let store = self.store.lock().expect("lock poisoned");
        let glob = glob_to_regex(pattern);
        Ok(store
            .iter()
            .filter(|(_, entry)| self.is_live(entry, now))
            .filter(|(key, _)| glob.is_match(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        Ok(ServerInfo {
            version: "in-memory-0".to_string(),
            uptime_seconds: 0,
        })
    }
}

/// Translate a Redis-style `*`/`?` glob into a regex, sufficient for the
/// patterns `list_locks` accepts.
fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut escaped = String::with_capacity(pattern.len() * 2);
    escaped.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => escaped.push_str(".*"),
            '?' => escaped.push('.'),
            c if regex::escape(&c.to_string()) != c.to_string() => {
                escaped.push_str(&regex::escape(&c.to_string()));
            }
            c => escaped.push(c),
        }
    }
    escaped.push('$');
    regex::Regex::new(&escaped).unwrap_or_else(|_| regex::Regex::new("^$").expect("valid"))
}
