//! Configuration types for the app connector
//!
//! This module defines all configuration structures used throughout the crate.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::dns::WILDCARD_PREFIX;

/// Upper bound for `stale_after_secs` and `cleanup_interval_secs` (ten years)
const MAX_STALE_AFTER_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main app connector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppcConfig {
    /// Domains routed through this node; `*.`-prefixed entries match subdomains
    #[serde(default)]
    pub domains: Vec<String>,

    /// Operator routes advertised regardless of DNS activity
    #[serde(default)]
    pub routes: Vec<IpNet>,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppcConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configured domains
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set the operator routes
    pub fn with_routes(mut self, routes: Vec<IpNet>) -> Self {
        self.routes = routes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        for domain in &self.domains {
            validate_domain_name(domain)?;
        }

        self.state_store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File state store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a discovered route may go unseen before it is withdrawn
    ///
    /// Zero withdraws a domain's route as soon as an answer for that domain
    /// no longer contains its address.
    #[serde(default)]
    pub stale_after_secs: u64,

    /// Minimum time between two stale-route collections for one domain
    ///
    /// Zero collects on every observation.
    #[serde(default)]
    pub cleanup_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.stale_after_secs > MAX_STALE_AFTER_SECS {
            return Err(crate::Error::config(format!(
                "stale_after_secs must be at most {} (got {})",
                MAX_STALE_AFTER_SECS, self.stale_after_secs
            )));
        }
        if self.cleanup_interval_secs > MAX_STALE_AFTER_SECS {
            return Err(crate::Error::config(format!(
                "cleanup_interval_secs must be at most {} (got {})",
                MAX_STALE_AFTER_SECS, self.cleanup_interval_secs
            )));
        }
        Ok(())
    }

    /// Staleness threshold as a chrono duration
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs.min(MAX_STALE_AFTER_SECS) as i64)
    }

    /// Cleanup interval as a chrono duration
    pub fn cleanup_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cleanup_interval_secs.min(MAX_STALE_AFTER_SECS) as i64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 0,
            cleanup_interval_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Validate a configured domain name, allowing a leading `*.` wildcard label
///
/// This implements basic RFC 1035 length and label checks. It's not
/// comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    let name = domain.trim();
    let name = match name.strip_prefix(WILDCARD_PREFIX) {
        Some(suffix) => {
            let suffix = suffix.trim_end_matches('.');
            if suffix.is_empty() {
                return Err(crate::Error::config(format!(
                    "Wildcard domain has no suffix: '{}'",
                    domain
                )));
            }
            suffix
        }
        None => name.trim_end_matches('.'),
    };

    if name.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    if name.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            name.len(),
            domain
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }
    }

    Ok(())
}
