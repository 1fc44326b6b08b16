//! WireGuard peer configuration.
//!
//! Plain values handed to the external peer library. Keys stay in their
//! base64 text form since that is what the library consumes; validation
//! only checks that they decode to 32 bytes.

use super::ConfigError;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use std::net::Ipv4Addr;
use zeroize::Zeroize;

/// Length of a Curve25519 key in bytes.
pub const KEY_LEN: usize = 32;

/// Default allowed-IP mask for the tunnel address.
pub const DEFAULT_ALLOWED_IP_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Default persistent keepalive in seconds (keeps NAT mappings open).
pub const DEFAULT_PERSISTENT_KEEPALIVE_SECS: u16 = 10;

/// Tunnel endpoint and key material.
#[derive(Clone, PartialEq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Deserialize))]
pub struct TunnelConfig {
    /// `[Interface] PrivateKey`, base64.
    pub private_key: String,
    /// `[Peer] PublicKey`, base64.
    pub peer_public_key: String,
    /// `[Interface] Address`.
    pub local_ip: Ipv4Addr,
    #[cfg_attr(
        not(target_os = "espidf"),
        serde(default = "default_allowed_ip_mask")
    )]
    pub allowed_ip_mask: Ipv4Addr,
    /// `[Peer] Endpoint` host.
    pub endpoint: String,
    /// `[Peer] Endpoint` port, also used as the listen port.
    pub port: u16,
    /// Keepalive interval in seconds. 0 disables.
    #[cfg_attr(
        not(target_os = "espidf"),
        serde(default = "default_persistent_keepalive")
    )]
    pub persistent_keepalive: u16,
}

#[cfg(not(target_os = "espidf"))]
fn default_allowed_ip_mask() -> Ipv4Addr {
    DEFAULT_ALLOWED_IP_MASK
}

#[cfg(not(target_os = "espidf"))]
fn default_persistent_keepalive() -> u16 {
    DEFAULT_PERSISTENT_KEEPALIVE_SECS
}

impl TunnelConfig {
    pub fn new(
        private_key: impl Into<String>,
        peer_public_key: impl Into<String>,
        local_ip: Ipv4Addr,
        endpoint: impl Into<String>,
        port: u16,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            private_key: private_key.into(),
            peer_public_key: peer_public_key.into(),
            local_ip,
            allowed_ip_mask: DEFAULT_ALLOWED_IP_MASK,
            endpoint: endpoint.into(),
            port,
            persistent_keepalive: DEFAULT_PERSISTENT_KEEPALIVE_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if decoded_key_len(&self.private_key) != Some(KEY_LEN) {
            return Err(ConfigError::InvalidKey("private"));
        }
        if decoded_key_len(&self.peer_public_key) != Some(KEY_LEN) {
            return Err(ConfigError::InvalidKey("peer public"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidFormat("empty endpoint".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let mask = u32::from(self.allowed_ip_mask);
        if mask.checked_shl(mask.leading_ones()).unwrap_or(0) != 0 {
            return Err(ConfigError::InvalidSubnetMask(self.allowed_ip_mask));
        }
        Ok(())
    }

    /// `host:port` as handed to the peer library.
    pub fn endpoint_addr(&self) -> String {
        format!("{}:{}", self.endpoint, self.port)
    }
}

fn decoded_key_len(key: &str) -> Option<usize> {
    STANDARD.decode(key.trim()).ok().map(|bytes| bytes.len())
}

impl Drop for TunnelConfig {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("peer_public_key", &self.peer_public_key)
            .field("local_ip", &self.local_ip)
            .field("allowed_ip_mask", &self.allowed_ip_mask)
            .field("endpoint", &self.endpoint_addr())
            .field("persistent_keepalive", &self.persistent_keepalive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
    const PUBLIC: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    fn config() -> TunnelConfig {
        TunnelConfig::new(PRIVATE, PUBLIC, Ipv4Addr::new(10, 6, 0, 2), "vpn.example.net", 51820)
            .unwrap()
    }

    #[test]
    fn test_valid_config() {
        let config = config();
        assert_eq!(config.allowed_ip_mask, DEFAULT_ALLOWED_IP_MASK);
        assert_eq!(config.persistent_keepalive, 10);
        assert_eq!(config.endpoint_addr(), "vpn.example.net:51820");
    }

    #[test]
    fn test_bad_private_key() {
        let result = TunnelConfig::new("not-a-key", PUBLIC, Ipv4Addr::LOCALHOST, "h", 1);
        assert_eq!(result.err(), Some(ConfigError::InvalidKey("private")));
    }

    #[test]
    fn test_short_public_key() {
        // Valid base64, but only 3 bytes
        let result = TunnelConfig::new(PRIVATE, "AAAA", Ipv4Addr::LOCALHOST, "h", 1);
        assert_eq!(result.err(), Some(ConfigError::InvalidKey("peer public")));
    }

    #[test]
    fn test_zero_port() {
        let result = TunnelConfig::new(PRIVATE, PUBLIC, Ipv4Addr::LOCALHOST, "h", 0);
        assert_eq!(result.err(), Some(ConfigError::InvalidPort));
    }

    #[test]
    fn test_bad_mask() {
        let mut config = config();
        config.allowed_ip_mask = Ipv4Addr::new(255, 0, 255, 0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSubnetMask(_))
        ));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains(PRIVATE));
        assert!(debug.contains("vpn.example.net"));
    }
}
