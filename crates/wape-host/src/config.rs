//! Plugin host configuration.
//!
//! ```toml
//! [network]
//! enabled = true
//! networks_allowed = ["tcp"]
//! addresses_allowed = ["example.com:80"]
//! dial_timeout_secs = 10
//!
//! [runtime]
//! max_memory_bytes = 67108864
//! timeout_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::net::DialPolicy;

/// Top-level plugin host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WapeConfig {
    /// Network bridge settings.
    pub network: NetworkConfig,
    /// Engine and store limits.
    pub runtime: RuntimeConfig,
}

impl WapeConfig {
    /// Load configuration from a file. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Parse TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON configuration.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the host cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network = &self.network;
        if network.dial_timeout_secs == 0 {
            return Err(invalid("network.dial_timeout_secs", "must be greater than zero"));
        }
        if network.io_timeout_secs == Some(0) {
            return Err(invalid("network.io_timeout_secs", "must be greater than zero"));
        }
        if network.max_connections == 0 {
            return Err(invalid("network.max_connections", "must be greater than zero"));
        }
        if network.max_pending_operations == 0 {
            return Err(invalid(
                "network.max_pending_operations",
                "must be greater than zero",
            ));
        }
        if self.runtime.timeout_secs == 0 {
            return Err(invalid("runtime.timeout_secs", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

/// Network bridge configuration.
///
/// Everything is denied by default: the bridge is not registered at all
/// unless `enabled` is set, and a dial only succeeds if both the network
/// and the literal address string are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Register the network host functions.
    pub enabled: bool,
    /// Allowed networks (`tcp`, `tcp4`, `tcp6`, `udp`, `udp4`, `udp6`).
    pub networks_allowed: Vec<String>,
    /// Allow every network.
    pub networks_allow_all: bool,
    /// Allowed `host:port` addresses, matched literally.
    pub addresses_allowed: Vec<String>,
    /// Allow every address.
    pub addresses_allow_all: bool,
    /// Upper bound for resolving and connecting in `dial` and `lookupHost`.
    pub dial_timeout_secs: u64,
    /// Deadline for a single read or write. `None` waits indefinitely.
    pub io_timeout_secs: Option<u64>,
    /// Maximum number of live connections per plugin instance.
    pub max_connections: usize,
    /// Maximum number of registered operation handles per plugin instance.
    pub max_pending_operations: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            networks_allowed: Vec::new(),
            networks_allow_all: false,
            addresses_allowed: Vec::new(),
            addresses_allow_all: false,
            dial_timeout_secs: 10,
            io_timeout_secs: None,
            max_connections: 64,
            max_pending_operations: 1024,
        }
    }
}

impl NetworkConfig {
    /// Create a disabled configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the bridge.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add an allowed network.
    pub fn allow_network(mut self, network: impl Into<String>) -> Self {
        self.networks_allowed.push(network.into());
        self
    }

    /// Allow every network.
    pub fn allow_all_networks(mut self) -> Self {
        self.networks_allow_all = true;
        self
    }

    /// Add an allowed address.
    pub fn allow_address(mut self, address: impl Into<String>) -> Self {
        self.addresses_allowed.push(address.into());
        self
    }

    /// Allow every address.
    pub fn allow_all_addresses(mut self) -> Self {
        self.addresses_allow_all = true;
        self
    }

    /// Set the dial timeout.
    pub fn with_dial_timeout_secs(mut self, secs: u64) -> Self {
        self.dial_timeout_secs = secs;
        self
    }

    /// Set the per-operation I/O timeout.
    pub fn with_io_timeout_secs(mut self, secs: u64) -> Self {
        self.io_timeout_secs = Some(secs);
        self
    }

    /// Set the live connection limit.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the registered handle limit.
    pub fn with_max_pending_operations(mut self, max: usize) -> Self {
        self.max_pending_operations = max;
        self
    }

    /// Build the immutable dial policy from the allow-lists.
    pub fn policy(&self) -> DialPolicy {
        DialPolicy::new(
            self.networks_allowed.iter().cloned(),
            self.networks_allow_all,
            self.addresses_allowed.iter().cloned(),
            self.addresses_allow_all,
        )
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

/// Engine and store limits for a plugin instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum linear memory in bytes (default: 64 MiB).
    pub max_memory_bytes: Option<usize>,
    /// Execution budget in seconds, converted to fuel.
    pub timeout_secs: u64,
    /// Give the guest the host's stdin, stdout and stderr.
    pub inherit_stdio: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: Some(64 * 1024 * 1024),
            timeout_secs: 30,
            inherit_stdio: false,
        }
    }
}

impl RuntimeConfig {
    /// Roughly 33M instructions per second of budget.
    pub fn fuel(&self) -> u64 {
        const FUEL_PER_SEC: u64 = 33_000_000;
        FUEL_PER_SEC.saturating_mul(self.timeout_secs.max(1))
    }
}
