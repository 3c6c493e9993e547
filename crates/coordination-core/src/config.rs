//! Runtime configuration, loaded from the environment.
//!
//! Mirrors the original implementation's `Config` dataclass
//! (`SERVER_NAME`, `SERVER_PORT`, `REDIS_URL`, `DEFAULT_LOCK_TIMEOUT`,
//! `HEARTBEAT_TTL`, the four staleness thresholds) plus a few knobs the
//! distillation left unspecified (`MAX_LOCK_TIMEOUT`, `LOCK_NAMESPACE`,
//! `KVG_CALL_TIMEOUT_MS`).

use crate::error::Error;

/// Coordination service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name reported by `health_check`.
    pub server_name: String,
    /// Port the RPC transport listens on (transport is out of scope here;
    /// kept for the `health_check` shape and any future transport).
    pub server_port: u16,
    /// Backend connection string, e.g. `redis://localhost:6379/0`.
    pub backend_url: String,
    /// `<root>` prefix for all storage keys. Any stable value is acceptable.
    pub lock_namespace: String,
    /// Default lock TTL in seconds when a caller doesn't specify one.
    pub default_lock_timeout_secs: i64,
    /// Upper bound a caller-supplied TTL is clamped to.
    pub max_lock_timeout_secs: i64,
    /// TTL of the heartbeat key.
    pub heartbeat_ttl_secs: i64,
    /// Heartbeat age below which a session is `active`.
    pub active_threshold_secs: i64,
    /// Heartbeat age below which a session is `idle`.
    pub idle_threshold_secs: i64,
    /// Heartbeat age below which a session is `stale`.
    pub stale_threshold_secs: i64,
    /// Heartbeat age below which a session is `abandoned`; beyond this it
    /// is still reported, just at the top tier.
    pub abandoned_threshold_secs: i64,
    /// Per-call timeout applied to every KVG backend operation.
    pub kvg_call_timeout_ms: u64,
    /// `tracing-subscriber` default directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "mcp-coordination".into(),
            server_port: 8082,
            backend_url: "redis://localhost:6379/0".into(),
            lock_namespace: "claude".into(),
            default_lock_timeout_secs: 300,
            max_lock_timeout_secs: 3600,
            heartbeat_ttl_secs: 300,
            active_threshold_secs: 300,
            idle_threshold_secs: 3_600,
            stale_threshold_secs: 14_400,
            abandoned_threshold_secs: 86_400,
            kvg_call_timeout_ms: 2_000,
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset, then [`Config::validate`].
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if a numeric variable fails to
    /// parse or the staleness thresholds aren't strictly increasing.
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            server_name: env_or("SERVER_NAME", defaults.server_name),
            server_port: env_parsed_or("SERVER_PORT", defaults.server_port)?,
            backend_url: env_or("BACKEND_URL", defaults.backend_url),
            lock_namespace: env_or("LOCK_NAMESPACE", defaults.lock_namespace),
            default_lock_timeout_secs: env_parsed_or(
                "DEFAULT_LOCK_TIMEOUT",
                defaults.default_lock_timeout_secs,
            )?,
            max_lock_timeout_secs: env_parsed_or(
                "MAX_LOCK_TIMEOUT",
                defaults.max_lock_timeout_secs,
            )?,
            heartbeat_ttl_secs: env_parsed_or("HEARTBEAT_TTL", defaults.heartbeat_ttl_secs)?,
            active_threshold_secs: env_parsed_or(
                "ACTIVE_THRESHOLD",
                defaults.active_threshold_secs,
            )?,
            idle_threshold_secs: env_parsed_or("IDLE_THRESHOLD", defaults.idle_threshold_secs)?,
            stale_threshold_secs: env_parsed_or(
                "STALE_THRESHOLD",
                defaults.stale_threshold_secs,
            )?,
            abandoned_threshold_secs: env_parsed_or(
                "ABANDONED_THRESHOLD",
                defaults.abandoned_threshold_secs,
            )?,
            kvg_call_timeout_ms: env_parsed_or(
                "KVG_CALL_TIMEOUT_MS",
                defaults.kvg_call_timeout_ms,
            )?,
            log_level: env_or("LOG_LEVEL", defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that must hold before the service starts.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` describing the first violated
    /// invariant found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.active_threshold_secs <= 0 {
            return Err(Error::InvalidArgument(
                "active_threshold_secs must be positive".into(),
            ));
        }
        let tiers = [
            self.active_threshold_secs,
            self.idle_threshold_secs,
            self.stale_threshold_secs,
            self.abandoned_threshold_secs,
        ];
        if !tiers.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(Error::InvalidArgument(
                "staleness thresholds must be strictly increasing: active < idle < stale < abandoned"
                    .into(),
            ));
        }
        if self.default_lock_timeout_secs <= 0 {
            return Err(Error::InvalidArgument(
                "default_lock_timeout_secs must be positive".into(),
            ));
        }
        if self.max_lock_timeout_secs < self.default_lock_timeout_secs {
            return Err(Error::InvalidArgument(
                "max_lock_timeout_secs must be >= default_lock_timeout_secs".into(),
            ));
        }
        if self.lock_namespace.is_empty() {
            return Err(Error::InvalidArgument(
                "lock_namespace must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("{name} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        let mut config = Config::default();
        config.idle_threshold_secs = config.active_threshold_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_max_timeout_below_default() {
        let mut config = Config::default();
        config.max_lock_timeout_secs = config.default_lock_timeout_secs - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_namespace() {
        let mut config = Config::default();
        config.lock_namespace = String::new();
        assert!(config.validate().is_err());
    }
}
