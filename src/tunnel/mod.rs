//! WireGuard tunnel on top of the WiFi link.
//!
//! [`Tunnel`] is a [`Component`] with a setup priority just below WiFi, so
//! the host only brings it up once the link manager reports it can proceed.
//! The tunnel implementation itself sits behind [`PeerLink`].

mod sim;

pub use sim::SimPeer;

use crate::component::{setup_priority, AppError, Component};
use crate::config::{ConfigError, TunnelConfig};
use log::{info, warn};
use std::fmt;

/// Operations a WireGuard implementation provides.
pub trait PeerLink {
    /// Prepare the interface from the configuration.
    fn init(&mut self, config: &TunnelConfig) -> Result<(), TunnelError>;

    /// Start the handshake. Returns once the request is queued.
    fn connect(&mut self) -> Result<(), TunnelError>;

    /// Whether the peer completed a handshake recently.
    fn peer_is_up(&mut self) -> bool;

    fn disconnect(&mut self);
}

/// Observed tunnel state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TunnelStatus {
    /// Not set up yet, or setup failed.
    #[default]
    Idle,
    /// Handshake requested; peer not confirmed.
    Connecting,
    Up,
    /// Peer was up and stopped answering.
    Down,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Idle => "idle",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Up => "up",
            TunnelStatus::Down => "down",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunnel errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelError {
    Config(ConfigError),
    /// The implementation refused the configuration.
    Init(String),
    /// The handshake could not be started.
    Connect(String),
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::Config(e) => write!(f, "invalid tunnel config: {}", e),
            TunnelError::Init(msg) => write!(f, "tunnel init failed: {}", msg),
            TunnelError::Connect(msg) => write!(f, "tunnel connect failed: {}", msg),
        }
    }
}

impl std::error::Error for TunnelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TunnelError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TunnelError {
    fn from(e: ConfigError) -> Self {
        TunnelError::Config(e)
    }
}

/// WireGuard tunnel component.
pub struct Tunnel<P: PeerLink> {
    peer: P,
    config: TunnelConfig,
    status: TunnelStatus,
    connected: bool,
}

impl<P: PeerLink> Tunnel<P> {
    pub fn new(config: TunnelConfig, peer: P) -> Self {
        Self {
            peer,
            config,
            status: TunnelStatus::Idle,
            connected: false,
        }
    }

    pub fn status(&self) -> TunnelStatus {
        self.status
    }

    pub fn is_up(&self) -> bool {
        self.status == TunnelStatus::Up
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    fn start(&mut self) -> Result<(), TunnelError> {
        self.config.validate()?;
        self.peer.init(&self.config)?;
        self.peer.connect()?;
        self.connected = true;
        self.status = TunnelStatus::Connecting;
        info!(
            "WireGuard connecting to {} as {}",
            self.config.endpoint_addr(),
            self.config.local_ip
        );
        Ok(())
    }

    fn refresh(&mut self) {
        if !self.connected {
            return;
        }
        let up = self.peer.peer_is_up();
        let next = match (self.status, up) {
            (_, true) => TunnelStatus::Up,
            (TunnelStatus::Up, false) => TunnelStatus::Down,
            (status, false) => status,
        };
        if next != self.status {
            match next {
                TunnelStatus::Up => info!("WireGuard peer is up"),
                _ => warn!("WireGuard peer is {}", next),
            }
            self.status = next;
        }
    }
}

impl<P: PeerLink> Component for Tunnel<P> {
    fn name(&self) -> &'static str {
        "wireguard"
    }

    fn setup_priority(&self) -> f32 {
        setup_priority::AFTER_WIFI
    }

    fn setup(&mut self) -> Result<(), AppError> {
        self.start().map_err(AppError::from)
    }

    fn tick(&mut self) -> Result<(), AppError> {
        self.refresh();
        Ok(())
    }

    fn dump_config(&self) {
        info!("WireGuard:");
        info!("  Address: {}/{}", self.config.local_ip, self.config.allowed_ip_mask);
        info!("  Endpoint: {}", self.config.endpoint_addr());
        info!("  Keepalive: {} s", self.config.persistent_keepalive);
        info!("  Status: {}", self.status);
    }
}

impl<P: PeerLink> Drop for Tunnel<P> {
    fn drop(&mut self) {
        if self.connected {
            self.peer.disconnect();
        }
    }
}
