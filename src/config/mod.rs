//! Node configuration management.
//!
//! This module provides the plain-value configuration consumed by the link
//! manager and the tunnel adapter.
//!
//! # Components
//!
//! - [`wifi`] - Station candidates, fallback AP and link timing (host-testable)
//! - [`wireguard`] - WireGuard peer settings (host-testable)
//!
//! On the host, both are loaded from a JSON file with [`load_from_path`].
//! On ESP32, station credentials come from NVS (see [`crate::wifi`]).

mod wifi;
mod wireguard;

pub use wifi::{
    decode_candidates, encode_candidates, ApConfig, Bssid, Candidate, ConfigError, LinkConfig,
    ManualIp, PowerSaveMode, Timeouts, MAX_PASSWORD_LEN, MAX_SSID_LEN, MAX_STORED_CANDIDATES,
    MIN_PASSWORD_LEN, OUTPUT_POWER_RANGE_DBM,
};
pub use wireguard::{TunnelConfig, DEFAULT_ALLOWED_IP_MASK, DEFAULT_PERSISTENT_KEEPALIVE_SECS};

/// Top-level node configuration file.
///
/// ```json
/// {
///   "link": {
///     "candidates": [{ "ssid": "home", "password": "hunter2hunter2", "priority": 1.0 }],
///     "ap": { "ssid": "node-fallback", "password": "fallback123" }
///   },
///   "tunnel": {
///     "private_key": "...", "peer_public_key": "...",
///     "local_ip": "10.6.0.2", "endpoint": "vpn.example.net", "port": 51820
///   }
/// }
/// ```
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NodeConfig {
    pub link: LinkConfig,
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,
}

#[cfg(not(target_os = "espidf"))]
impl NodeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.link.validate()?;
        if let Some(tunnel) = &config.tunnel {
            tunnel.validate()?;
        }
        Ok(config)
    }
}

/// Load the node configuration from a JSON file.
#[cfg(not(target_os = "espidf"))]
pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<NodeConfig, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    NodeConfig::from_json(&json)
}
