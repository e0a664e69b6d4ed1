//! Discovery Configuration
//!
//! Centralized configuration for the bootstrap protocol with environment
//! variable overrides. Every timing knob of the discovery and seed-list
//! state machines lives here so tests can shrink them to milliseconds.

use crate::address::NodeAddress;
use std::time::Duration;

/// Discovery configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    // Store layout
    /// Base directory key in etcd (env: HUDDLE_ETCD_PATH)
    pub etcd_path: String,

    /// Key holding the current leader's address (under `etcd_path`)
    pub leader_path: String,

    /// Directory key under which seed entries live (under `etcd_path`)
    pub seeds_path: String,

    // Leader tenure
    /// TTL on the leader key; a crashed leader's claim expires after this
    /// (env: HUDDLE_LEADER_TTL_SECS)
    pub leader_entry_ttl: Duration,

    /// Period of the leader-key refresh; must be strictly less than
    /// `leader_entry_ttl` (env: HUDDLE_REFRESH_INTERVAL_SECS)
    pub leader_refresh_interval: Duration,

    // Retry discipline
    /// Delay before re-issuing a store operation that failed transiently
    /// (env: HUDDLE_RETRY_DELAY_MS)
    pub etcd_retry_delay: Duration,

    /// Bound on the initial seed-list fetch
    pub seeds_fetch_timeout: Duration,

    /// Delay before re-contending for leadership after a dead-end election
    pub election_retry_delay: Duration,

    // Node identity and endpoints
    /// Etcd endpoints (env: ETCD_ENDPOINTS, comma-separated)
    pub etcd_endpoints: Vec<String>,

    /// Stable address of this node, as the membership layer knows it
    /// (env: HUDDLE_NODE_ADDRESS)
    pub node_address: NodeAddress,

    /// HTTP bind address for health/status/metrics (env: BIND_ADDR)
    pub bind_addr: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            etcd_path: "/huddle".to_string(),
            leader_path: "/huddle/leader".to_string(),
            seeds_path: "/huddle/seeds".to_string(),

            leader_entry_ttl: Duration::from_secs(15),
            leader_refresh_interval: Duration::from_secs(5),

            etcd_retry_delay: Duration::from_secs(1),
            seeds_fetch_timeout: Duration::from_secs(5),
            election_retry_delay: Duration::from_secs(2),

            etcd_endpoints: vec!["http://127.0.0.1:2379".to_string()],
            node_address: NodeAddress::new("127.0.0.1:9000"),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HUDDLE_ETCD_PATH") {
            config.set_base_path(&path);
        }

        if let Ok(ttl) = std::env::var("HUDDLE_LEADER_TTL_SECS") {
            if let Ok(parsed) = ttl.parse::<u64>() {
                config.leader_entry_ttl = Duration::from_secs(parsed);
            }
        }

        if let Ok(interval) = std::env::var("HUDDLE_REFRESH_INTERVAL_SECS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                config.leader_refresh_interval = Duration::from_secs(parsed);
            }
        }

        if let Ok(delay) = std::env::var("HUDDLE_RETRY_DELAY_MS") {
            if let Ok(parsed) = delay.parse::<u64>() {
                config.etcd_retry_delay = Duration::from_millis(parsed);
            }
        }

        if let Ok(endpoints) = std::env::var("ETCD_ENDPOINTS") {
            config.etcd_endpoints = endpoints.split(',').map(String::from).collect();
        }

        if let Ok(addr) = std::env::var("HUDDLE_NODE_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.node_address = parsed;
            }
        }

        if let Ok(bind) = std::env::var("BIND_ADDR") {
            config.bind_addr = bind;
        }

        config
    }

    /// Re-anchor the store layout under a new base directory.
    /// `leader_path` and `seeds_path` are derived from it.
    pub fn set_base_path(&mut self, base: &str) {
        let base = base.trim_end_matches('/');
        self.etcd_path = base.to_string();
        self.leader_path = format!("{base}/leader");
        self.seeds_path = format!("{base}/seeds");
    }

    /// Check invariants the state machines depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.etcd_path.is_empty() || !self.etcd_path.starts_with('/') {
            return Err(ConfigError::BadPath(self.etcd_path.clone()));
        }
        if self.leader_refresh_interval >= self.leader_entry_ttl {
            return Err(ConfigError::RefreshNotBelowTtl {
                refresh: self.leader_refresh_interval,
                ttl: self.leader_entry_ttl,
            });
        }
        if self.etcd_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(())
    }
}

/// Configuration validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("etcd base path {0:?} must be a non-empty absolute key")]
    BadPath(String),

    #[error("leader refresh interval {refresh:?} must be strictly less than leader TTL {ttl:?}")]
    RefreshNotBelowTtl { refresh: Duration, ttl: Duration },

    #[error("at least one etcd endpoint is required")]
    NoEndpoints,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DiscoveryConfig::default().validate().unwrap();
    }

    #[test]
    fn refresh_must_stay_below_ttl() {
        let mut config = DiscoveryConfig::default();
        config.leader_entry_ttl = Duration::from_secs(5);
        config.leader_refresh_interval = Duration::from_secs(5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RefreshNotBelowTtl { .. })
        ));
    }

    #[test]
    fn base_path_derives_leader_and_seeds() {
        let mut config = DiscoveryConfig::default();
        config.set_base_path("/clusters/blue/");
        assert_eq!(config.etcd_path, "/clusters/blue");
        assert_eq!(config.leader_path, "/clusters/blue/leader");
        assert_eq!(config.seeds_path, "/clusters/blue/seeds");
        config.validate().unwrap();
    }

    #[test]
    fn relative_base_path_is_rejected() {
        let mut config = DiscoveryConfig::default();
        config.set_base_path("huddle");
        assert!(matches!(config.validate(), Err(ConfigError::BadPath(_))));
    }
}
