//! Simulated WireGuard peer for host runs and tests.

use super::{PeerLink, TunnelError};
use crate::config::TunnelConfig;
use log::debug;
use std::cell::Cell;
use std::rc::Rc;

/// Scripted [`PeerLink`]: the handshake completes after a number of polls
/// while the peer is reachable.
#[derive(Debug)]
pub struct SimPeer {
    /// Polls of `peer_is_up` before the handshake completes.
    pub handshake_polls: u32,
    pub reject_init: bool,
    pub reject_connect: bool,
    reachable: bool,
    endpoint: Option<String>,
    connecting: bool,
    polls_left: u32,
    connects: u32,
    disconnects: Rc<Cell<u32>>,
}

impl Default for SimPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeer {
    pub fn new() -> Self {
        Self {
            handshake_polls: 0,
            reject_init: false,
            reject_connect: false,
            reachable: true,
            endpoint: None,
            connecting: false,
            polls_left: 0,
            connects: 0,
            disconnects: Rc::new(Cell::new(0)),
        }
    }

    pub fn initialized(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn connects(&self) -> u32 {
        self.connects
    }

    /// Shared counter that outlives the peer.
    pub fn disconnect_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.disconnects)
    }

    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }
}

impl PeerLink for SimPeer {
    fn init(&mut self, config: &TunnelConfig) -> Result<(), TunnelError> {
        if self.reject_init {
            return Err(TunnelError::Init("interface unavailable".into()));
        }
        self.endpoint = Some(config.endpoint_addr());
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TunnelError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(TunnelError::Connect("not initialized".into()));
        };
        if self.reject_connect {
            return Err(TunnelError::Connect(format!("{} unreachable", endpoint)));
        }
        debug!("sim: handshake with {}", endpoint);
        self.connects += 1;
        self.connecting = true;
        self.polls_left = self.handshake_polls;
        Ok(())
    }

    fn peer_is_up(&mut self) -> bool {
        if !self.connecting || !self.reachable {
            return false;
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return false;
        }
        true
    }

    fn disconnect(&mut self) {
        self.connecting = false;
        self.disconnects.set(self.disconnects.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> TunnelConfig {
        TunnelConfig::new(
            "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=",
            "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=",
            Ipv4Addr::new(10, 6, 0, 2),
            "vpn.example.net",
            51820,
        )
        .unwrap()
    }

    #[test]
    fn test_connect_requires_init() {
        let mut peer = SimPeer::new();
        assert!(matches!(peer.connect(), Err(TunnelError::Connect(_))));
        peer.init(&config()).unwrap();
        peer.connect().unwrap();
        assert!(peer.peer_is_up());
    }

    #[test]
    fn test_rejected_connect_names_endpoint() {
        let mut peer = SimPeer::new();
        peer.reject_connect = true;
        peer.init(&config()).unwrap();
        match peer.connect() {
            Err(TunnelError::Connect(msg)) => assert!(msg.contains("vpn.example.net:51820")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_stops_handshake() {
        let mut peer = SimPeer::new();
        peer.init(&config()).unwrap();
        peer.connect().unwrap();
        peer.disconnect();
        assert!(!peer.peer_is_up());
        assert_eq!(peer.disconnect_counter().get(), 1);
    }
}
