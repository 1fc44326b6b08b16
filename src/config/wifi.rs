//! WiFi link configuration data structures.
//!
//! This module contains platform-independent types for station candidates,
//! the fallback access point and link timing that can be tested on the host
//! machine.
//!
//! # Example
//!
//! ```
//! use wireguard_esp32::config::{Candidate, LinkConfig};
//!
//! let home = Candidate::new("MyNetwork", "MyPassword").unwrap().with_priority(1.0);
//! let config = LinkConfig::with_candidates(vec![home]);
//! assert!(config.validate().is_ok());
//! assert!(config.has_sta());
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use zeroize::Zeroize;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Valid output power range in dBm accepted by the radio.
pub const OUTPUT_POWER_RANGE_DBM: (f32, f32) = (8.5, 20.5);

/// Check SSID and password length rules shared by stations and the AP.
fn validate_credentials(ssid: &str, password: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() {
        return Err(ConfigError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ConfigError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }

    // Empty is OK for open networks
    if !password.is_empty() && password.len() < MIN_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooShort {
            len: password.len(),
            min: MIN_PASSWORD_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }

    Ok(())
}

// ==================== BSSID ====================

/// Access point hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    not(target_os = "espidf"),
    derive(serde::Deserialize),
    serde(try_from = "String")
)]
pub struct Bssid(pub [u8; 6]);

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for Bssid {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ConfigError::InvalidFormat(format!("short BSSID: {}", s)))?;
            if part.len() != 2 {
                return Err(ConfigError::InvalidFormat(format!("bad BSSID octet: {}", part)));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| ConfigError::InvalidFormat(format!("bad BSSID octet: {}", part)))?;
        }
        if parts.next().is_some() {
            return Err(ConfigError::InvalidFormat(format!("long BSSID: {}", s)));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Bssid {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ==================== Static addressing ====================

/// Static IPv4 settings used instead of DHCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Deserialize))]
pub struct ManualIp {
    pub static_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    /// The first DNS server. 0.0.0.0 for default.
    #[cfg_attr(not(target_os = "espidf"), serde(default = "unspecified"))]
    pub dns1: Ipv4Addr,
    /// The second DNS server. 0.0.0.0 for default.
    #[cfg_attr(not(target_os = "espidf"), serde(default = "unspecified"))]
    pub dns2: Ipv4Addr,
}

#[cfg(not(target_os = "espidf"))]
fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl ManualIp {
    /// Static address with default DNS servers.
    pub fn new(static_ip: Ipv4Addr, gateway: Ipv4Addr, subnet: Ipv4Addr) -> Self {
        Self {
            static_ip,
            gateway,
            subnet,
            dns1: Ipv4Addr::UNSPECIFIED,
            dns2: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Subnet mask as a prefix length, or `None` if the mask is not contiguous.
    pub fn prefix_len(&self) -> Option<u8> {
        let mask = u32::from(self.subnet);
        let ones = mask.leading_ones();
        if mask.checked_shl(ones).unwrap_or(0) != 0 {
            return None;
        }
        Some(ones as u8)
    }

    /// DNS servers that are actually set.
    pub fn dns_servers(&self) -> impl Iterator<Item = Ipv4Addr> {
        [self.dns1, self.dns2]
            .into_iter()
            .filter(|ip| !ip.is_unspecified())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix_len().is_none() {
            return Err(ConfigError::InvalidSubnetMask(self.subnet));
        }
        Ok(())
    }
}

// ==================== Station candidates ====================

/// A configured station credential entry.
#[derive(Clone, PartialEq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Deserialize))]
pub struct Candidate {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub password: String,
    /// Only match this access point when set.
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub bssid: Option<Bssid>,
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub manual_ip: Option<ManualIp>,
    /// Explicit ranking weight. Unset candidates are ranked by signal.
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub priority: Option<f32>,
}

impl Candidate {
    /// Create a new candidate.
    ///
    /// Returns an error if SSID or password are invalid.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let candidate = Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: None,
            manual_ip: None,
            priority: None,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Create a candidate for an open network (no password).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_bssid(mut self, bssid: Bssid) -> Self {
        self.bssid = Some(bssid);
        self
    }

    pub fn with_manual_ip(mut self, manual_ip: ManualIp) -> Self {
        self.manual_ip = Some(manual_ip);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_credentials(&self.ssid, &self.password)?;
        if let Some(ip) = &self.manual_ip {
            ip.validate()?;
        }
        Ok(())
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Serialize to bytes for NVS storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.is_empty() {
            return Err(ConfigError::InvalidFormat("empty data".into()));
        }

        let ssid_len = bytes[0] as usize;
        if bytes.len() < 1 + ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }

        let ssid = String::from_utf8(bytes[1..1 + ssid_len].to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;

        let password_len = bytes[1 + ssid_len] as usize;
        let password_start = 2 + ssid_len;
        if bytes.len() < password_start + password_len {
            return Err(ConfigError::InvalidFormat("truncated password".into()));
        }

        let password =
            String::from_utf8(bytes[password_start..password_start + password_len].to_vec())
                .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;

        Self::new(ssid, password)
    }
}

impl Drop for Candidate {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

// Never print the password.
impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("ssid", &self.ssid)
            .field("bssid", &self.bssid)
            .field("manual_ip", &self.manual_ip)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// How many candidates fit in one stored credential list.
pub const MAX_STORED_CANDIDATES: usize = 4;

/// Serialize a candidate list for NVS storage.
///
/// Format: `[count:1]` then per candidate `[len:1][Candidate::to_bytes]`.
/// Only credentials are kept; priorities come from the firmware config.
pub fn encode_candidates(candidates: &[Candidate]) -> Result<Vec<u8>, ConfigError> {
    if candidates.len() > MAX_STORED_CANDIDATES {
        return Err(ConfigError::InvalidFormat(format!(
            "at most {} stored candidates",
            MAX_STORED_CANDIDATES
        )));
    }
    let mut bytes = vec![candidates.len() as u8];
    for candidate in candidates {
        candidate.validate()?;
        let mut entry = candidate.to_bytes();
        bytes.push(entry.len() as u8);
        bytes.extend_from_slice(&entry);
        entry.zeroize();
    }
    Ok(bytes)
}

/// Inverse of [`encode_candidates`].
pub fn decode_candidates(bytes: &[u8]) -> Result<Vec<Candidate>, ConfigError> {
    let (&count, mut rest) = bytes
        .split_first()
        .ok_or_else(|| ConfigError::InvalidFormat("empty data".into()))?;
    if count as usize > MAX_STORED_CANDIDATES {
        return Err(ConfigError::InvalidFormat("too many candidates".into()));
    }

    let mut candidates = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (&len, tail) = rest
            .split_first()
            .ok_or_else(|| ConfigError::InvalidFormat("truncated list".into()))?;
        if tail.len() < len as usize {
            return Err(ConfigError::InvalidFormat("truncated entry".into()));
        }
        let (entry, tail) = tail.split_at(len as usize);
        candidates.push(Candidate::from_bytes(entry)?);
        rest = tail;
    }
    Ok(candidates)
}

// ==================== Access point ====================

/// Self-hosted access point, used as fallback or as the only mode.
#[derive(Clone, PartialEq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Deserialize))]
pub struct ApConfig {
    pub ssid: String,
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub password: String,
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub channel: Option<u8>,
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub hidden: bool,
    #[cfg_attr(not(target_os = "espidf"), serde(default))]
    pub manual_ip: Option<ManualIp>,
}

impl ApConfig {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let ap = Self {
            ssid: ssid.into(),
            password: password.into(),
            channel: None,
            hidden: false,
            manual_ip: None,
        };
        ap.validate()?;
        Ok(ap)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_credentials(&self.ssid, &self.password)?;
        if let Some(channel) = self.channel {
            if !(1..=14).contains(&channel) {
                return Err(ConfigError::InvalidChannel(channel));
            }
        }
        if let Some(ip) = &self.manual_ip {
            ip.validate()?;
        }
        Ok(())
    }
}

impl Drop for ApConfig {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for ApConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApConfig")
            .field("ssid", &self.ssid)
            .field("channel", &self.channel)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

// ==================== Link policy ====================

/// Radio power saving level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    not(target_os = "espidf"),
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum PowerSaveMode {
    #[default]
    None,
    Light,
    High,
}

impl fmt::Display for PowerSaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Light => write!(f, "light"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Dwell limits for the link state machine, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    not(target_os = "espidf"),
    derive(serde::Deserialize),
    serde(default)
)]
pub struct Timeouts {
    pub scan_ms: u64,
    pub connect_ms: u64,
    pub cooldown_ms: u64,
    /// Escalate after this long without a connection. 0 disables.
    pub reboot_ms: u64,
    /// Delay the fallback AP until disconnected this long. 0 means immediately.
    pub ap_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            scan_ms: 10_000,
            connect_ms: 10_000,
            cooldown_ms: 5_000,
            reboot_ms: 15 * 60 * 1000,
            ap_ms: 0,
        }
    }
}

impl Timeouts {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_ms == 0 {
            return Err(ConfigError::InvalidTimeout("scan_ms must be > 0"));
        }
        if self.connect_ms == 0 {
            return Err(ConfigError::InvalidTimeout("connect_ms must be > 0"));
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::InvalidTimeout("cooldown_ms must be > 0"));
        }
        Ok(())
    }
}

/// Everything the link manager needs to know, as plain values.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    not(target_os = "espidf"),
    derive(serde::Deserialize),
    serde(default)
)]
pub struct LinkConfig {
    /// Station candidates in configuration order.
    pub candidates: Vec<Candidate>,
    pub ap: Option<ApConfig>,
    /// Require a scan match instead of blindly trying the best candidate.
    pub fast_connect: bool,
    pub timeouts: Timeouts,
    pub power_save: PowerSaveMode,
    pub output_power_dbm: Option<f32>,
    /// Applied to candidates without their own static settings.
    pub manual_ip: Option<ManualIp>,
}

impl LinkConfig {
    pub fn with_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    pub fn ap_only(ap: ApConfig) -> Self {
        Self {
            ap: Some(ap),
            ..Default::default()
        }
    }

    pub fn has_sta(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn has_ap(&self) -> bool {
        self.ap.is_some()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_sta() && !self.has_ap() {
            return Err(ConfigError::NothingConfigured);
        }
        for candidate in &self.candidates {
            candidate.validate()?;
        }
        self.validate_settings()
    }

    /// Validate everything except the candidate list.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if let Some(ap) = &self.ap {
            ap.validate()?;
        }
        if let Some(ip) = &self.manual_ip {
            ip.validate()?;
        }
        if let Some(power) = self.output_power_dbm {
            let (min, max) = OUTPUT_POWER_RANGE_DBM;
            if !(min..=max).contains(&power) {
                return Err(ConfigError::InvalidOutputPower(power));
            }
        }
        self.timeouts.validate()
    }
}

/// Errors that can occur during configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Neither station candidates nor an access point are configured.
    NothingConfigured,
    /// AP channel outside 1-14.
    InvalidChannel(u8),
    /// Subnet mask is not contiguous.
    InvalidSubnetMask(Ipv4Addr),
    /// Output power outside the supported range.
    InvalidOutputPower(f32),
    /// A timeout value is unusable.
    InvalidTimeout(&'static str),
    /// A WireGuard key is malformed.
    InvalidKey(&'static str),
    /// Endpoint port is zero.
    InvalidPort,
    /// Invalid data format during deserialization.
    InvalidFormat(String),
    /// Configuration file could not be read.
    Load(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::NothingConfigured => {
                write!(f, "no station candidates and no access point configured")
            }
            Self::InvalidChannel(ch) => write!(f, "invalid AP channel: {} (1-14)", ch),
            Self::InvalidSubnetMask(mask) => write!(f, "invalid subnet mask: {}", mask),
            Self::InvalidOutputPower(p) => write!(
                f,
                "output power {} dBm out of range ({}-{})",
                p, OUTPUT_POWER_RANGE_DBM.0, OUTPUT_POWER_RANGE_DBM.1
            ),
            Self::InvalidTimeout(msg) => write!(f, "invalid timeout: {}", msg),
            Self::InvalidKey(which) => write!(f, "invalid {} key", which),
            Self::InvalidPort => write!(f, "endpoint port must be non-zero"),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::Load(msg) => write!(f, "failed to load config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
