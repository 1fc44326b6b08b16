//! Simulated radio for host runs and tests.
//!
//! [`SimRadio`] answers the [`RadioDriver`] calls from a scripted list of
//! nearby networks. Scans and associations complete after a configurable
//! number of polls, and failures can be injected to exercise the retry and
//! fallback paths without hardware.

use super::radio::{ConnectionStatus, RadioDriver};
use super::scan::{ScanResult, SelectedCandidate};
use crate::config::{ApConfig, PowerSaveMode};
use log::debug;
use std::net::Ipv4Addr;

/// A network the simulated radio can see.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub beacon: ScanResult,
    pub password: String,
    /// Visible in scans but refuses association when `false`.
    pub reachable: bool,
}

impl SimNetwork {
    pub fn new(beacon: ScanResult, password: impl Into<String>) -> Self {
        Self {
            beacon,
            password: password.into(),
            reachable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Association {
    Idle,
    Pending { polls_left: u32, succeeds: bool },
    Up,
    Down,
}

/// Call counters for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub scans: u32,
    pub connects: u32,
    pub disconnects: u32,
    pub ap_starts: u32,
    pub ap_stops: u32,
    pub mode_changes: u32,
}

/// Scripted [`RadioDriver`].
#[derive(Debug, Clone)]
pub struct SimRadio {
    networks: Vec<SimNetwork>,
    /// Polls of `scan_complete` before a scan finishes.
    pub scan_delay_polls: u32,
    /// Polls of `connection_status` before an association resolves.
    pub connect_delay_polls: u32,
    /// Force this many upcoming associations to fail.
    pub failing_connects: u32,
    /// Reject `start_scan` synchronously.
    pub reject_scans: bool,
    /// Reject `start_ap` synchronously.
    pub reject_ap: bool,
    station: bool,
    ap_enabled: bool,
    ap_running: bool,
    scan_polls_left: Option<u32>,
    last_scan: Vec<ScanResult>,
    association: Association,
    ip: Option<Ipv4Addr>,
    connect_log: Vec<String>,
    power_save: PowerSaveMode,
    counters: SimCounters,
}

impl SimRadio {
    pub fn new(networks: Vec<SimNetwork>) -> Self {
        Self {
            networks,
            scan_delay_polls: 0,
            connect_delay_polls: 0,
            failing_connects: 0,
            reject_scans: false,
            reject_ap: false,
            station: false,
            ap_enabled: false,
            ap_running: false,
            scan_polls_left: None,
            last_scan: Vec::new(),
            association: Association::Idle,
            ip: None,
            connect_log: Vec::new(),
            power_save: PowerSaveMode::None,
            counters: SimCounters::default(),
        }
    }

    /// Scans never finish; associations never resolve.
    pub fn hanging(networks: Vec<SimNetwork>) -> Self {
        Self {
            scan_delay_polls: u32::MAX,
            connect_delay_polls: u32::MAX,
            ..Self::new(networks)
        }
    }

    pub fn counters(&self) -> SimCounters {
        self.counters
    }

    pub fn ap_running(&self) -> bool {
        self.ap_running
    }

    pub fn station_enabled(&self) -> bool {
        self.station
    }

    /// AP half of the last requested mode.
    pub fn ap_enabled(&self) -> bool {
        self.ap_enabled
    }

    pub fn power_save(&self) -> PowerSaveMode {
        self.power_save
    }

    /// SSIDs passed to `connect`, in order.
    pub fn connect_log(&self) -> &[String] {
        &self.connect_log
    }

    pub fn networks_mut(&mut self) -> &mut Vec<SimNetwork> {
        &mut self.networks
    }

    /// Simulate the access point going away while associated.
    pub fn drop_link(&mut self) {
        self.association = Association::Down;
        self.ip = None;
    }

    fn accepts(&self, target: &SelectedCandidate) -> bool {
        self.networks.iter().any(|n| {
            n.reachable
                && n.beacon.ssid == target.candidate.ssid
                && n.password == target.candidate.password
                && target.bssid.map_or(true, |b| b == n.beacon.bssid)
        })
    }

    fn assign_ip(&mut self, target_index: u32) {
        self.ip = Some(Ipv4Addr::new(192, 168, 1, 100 + (target_index % 100) as u8));
    }
}

impl RadioDriver for SimRadio {
    fn set_mode(&mut self, station: bool, ap: bool) -> bool {
        self.counters.mode_changes += 1;
        self.station = station;
        self.ap_enabled = ap;
        if !ap {
            self.ap_running = false;
        }
        if !station {
            self.association = Association::Idle;
            self.scan_polls_left = None;
            self.ip = None;
        }
        true
    }

    fn start_scan(&mut self) -> bool {
        if !self.station || self.reject_scans {
            return false;
        }
        self.counters.scans += 1;
        self.scan_polls_left = Some(self.scan_delay_polls);
        true
    }

    fn scan_complete(&mut self) -> bool {
        match self.scan_polls_left {
            Some(0) => {
                self.scan_polls_left = None;
                self.last_scan = self.networks.iter().map(|n| n.beacon.clone()).collect();
                debug!("sim: scan found {} networks", self.last_scan.len());
                true
            }
            Some(n) => {
                self.scan_polls_left = Some(n.saturating_sub(1));
                false
            }
            None => false,
        }
    }

    fn scan_results(&mut self) -> Vec<ScanResult> {
        self.last_scan.clone()
    }

    fn connect(&mut self, target: &SelectedCandidate) -> bool {
        if !self.station {
            return false;
        }
        self.counters.connects += 1;
        self.connect_log.push(target.ssid().to_string());

        let succeeds = if self.failing_connects > 0 {
            self.failing_connects -= 1;
            false
        } else {
            self.accepts(target)
        };
        self.association = Association::Pending {
            polls_left: self.connect_delay_polls,
            succeeds,
        };
        true
    }

    fn connection_status(&mut self) -> ConnectionStatus {
        match self.association {
            Association::Idle | Association::Down => ConnectionStatus::Down,
            Association::Up => ConnectionStatus::Up,
            Association::Pending {
                polls_left: 0,
                succeeds,
            } => {
                if succeeds {
                    self.association = Association::Up;
                    self.assign_ip(self.counters.connects);
                    ConnectionStatus::Up
                } else {
                    self.association = Association::Down;
                    ConnectionStatus::Down
                }
            }
            Association::Pending {
                polls_left,
                succeeds,
            } => {
                self.association = Association::Pending {
                    polls_left: polls_left.saturating_sub(1),
                    succeeds,
                };
                ConnectionStatus::Pending
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        self.counters.disconnects += 1;
        self.association = Association::Idle;
        self.scan_polls_left = None;
        self.ip = None;
        true
    }

    fn start_ap(&mut self, config: &ApConfig) -> bool {
        if !self.ap_enabled || self.reject_ap {
            return false;
        }
        debug!("sim: AP '{}' up", config.ssid);
        self.counters.ap_starts += 1;
        self.ap_running = true;
        true
    }

    fn stop_ap(&mut self) -> bool {
        self.counters.ap_stops += 1;
        self.ap_running = false;
        true
    }

    fn current_ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    fn apply_power_save(&mut self, mode: PowerSaveMode) -> bool {
        self.power_save = mode;
        true
    }
}
