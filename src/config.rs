//! Environment configuration
//!
//! All options are read once at startup. Unparseable numeric values fall
//! back to their defaults with a logged warning rather than aborting.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Default websocket listening port
const DEFAULT_PORT: u16 = 3000;

/// Default stored-state time-to-live: 48 hours
const DEFAULT_TTL_SECS: u64 = 172_800;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port (`PORT`)
    pub port: u16,
    /// External store target (`REDIS_URL`); absent means in-process store
    pub redis_url: Option<String>,
    /// Stored-state TTL window (`STATE_TTL_SECS`)
    pub ttl: Duration,
    /// Handshake origin policy (`ALLOWED_ORIGIN`); `None` is permissive
    pub allowed_origin: Option<String>,
}

impl Config {
    /// Read configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let port = match get("PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Unparseable PORT '{raw}', using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let ttl_secs = match get("STATE_TTL_SECS").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Unparseable STATE_TTL_SECS '{raw}', using {DEFAULT_TTL_SECS}");
                DEFAULT_TTL_SECS
            }),
            None => DEFAULT_TTL_SECS,
        };

        let redis_url = get("REDIS_URL").filter(|v| !v.is_empty());

        // "*" matches the permissive default and means no origin check
        let allowed_origin = get("ALLOWED_ORIGIN")
            .filter(|v| !v.is_empty())
            .filter(|v| v != "*");

        Self {
            port,
            redis_url,
            ttl: Duration::from_secs(ttl_secs),
            allowed_origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.ttl, Duration::from_secs(172_800));
        assert!(cfg.redis_url.is_none());
        assert!(cfg.allowed_origin.is_none());
    }

    #[test]
    fn test_explicit_values() {
        let cfg = config(&[
            ("PORT", "8080"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("STATE_TTL_SECS", "3600"),
            ("ALLOWED_ORIGIN", "https://example.com"),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(cfg.ttl, Duration::from_secs(3600));
        assert_eq!(cfg.allowed_origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let cfg = config(&[("PORT", "not-a-port"), ("STATE_TTL_SECS", "soon")]);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.ttl, Duration::from_secs(172_800));
    }

    #[test]
    fn test_wildcard_origin_is_permissive() {
        let cfg = config(&[("ALLOWED_ORIGIN", "*")]);
        assert!(cfg.allowed_origin.is_none());
    }

    #[test]
    fn test_empty_values_treated_as_absent() {
        let cfg = config(&[("REDIS_URL", ""), ("PORT", "")]);
        assert!(cfg.redis_url.is_none());
        assert_eq!(cfg.port, 3000);
    }
}
