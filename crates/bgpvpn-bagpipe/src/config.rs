//! Configuration file support for bgpvpnd.
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: /etc/bgpvpn/bagpipe.toml

use std::fs;
use std::path::Path;

use bgpvpn_types::VpnType;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bgpvpn/bagpipe.toml";

/// Driver policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// `device_owner` prefix of ports owned by the network service itself.
    #[serde(default = "default_network_owner_prefix")]
    pub network_owner_prefix: String,

    /// Platform-owned device owners that still get notifications.
    #[serde(default = "default_probe_owners")]
    pub probe_owners: Vec<String>,

    /// VPN types whose route targets are sent to the agent.
    #[serde(default = "default_emitted_vpn_types")]
    pub emitted_vpn_types: Vec<VpnType>,

    /// Router associations accepted per BGPVPN.
    #[serde(default = "default_max_router_assocs")]
    pub max_router_assocs_per_bgpvpn: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Complete bgpvpnd configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagpipeConfig {
    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_network_owner_prefix() -> String {
    "network:".to_string()
}

fn default_probe_owners() -> Vec<String> {
    vec!["network:probe".to_string(), "compute:probe".to_string()]
}

fn default_emitted_vpn_types() -> Vec<VpnType> {
    crate::projector::EMITTED_VPN_TYPES.to_vec()
}

fn default_max_router_assocs() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            network_owner_prefix: default_network_owner_prefix(),
            probe_owners: default_probe_owners(),
            emitted_vpn_types: default_emitted_vpn_types(),
            max_router_assocs_per_bgpvpn: default_max_router_assocs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl BagpipeConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.network_owner_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "driver.network_owner_prefix",
                "must not be empty",
            ));
        }

        if self.driver.max_router_assocs_per_bgpvpn == 0 {
            return Err(ConfigError::invalid(
                "driver.max_router_assocs_per_bgpvpn",
                "must be > 0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }

        Ok(())
    }
}
