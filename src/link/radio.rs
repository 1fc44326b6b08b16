//! Radio driver abstraction.
//!
//! The link manager only talks to the radio through [`RadioDriver`]. Every
//! operation is a non-blocking request that reports synchronous acceptance
//! as a `bool`; completion is observed later by polling
//! [`RadioDriver::scan_complete`] and [`RadioDriver::connection_status`].
//!
//! Implementations that receive platform callbacks on another execution
//! context must only set flags or copy data from them.

use super::scan::{ScanResult, SelectedCandidate};
use crate::config::{ApConfig, PowerSaveMode};
use std::net::Ipv4Addr;

/// Association progress as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Association or DHCP still in progress.
    Pending,
    /// Associated and addressed.
    Up,
    /// Not associated (failed, dropped or never started).
    Down,
}

/// Radio capabilities consumed by the link manager.
pub trait RadioDriver {
    /// Enable or disable station and AP interfaces.
    fn set_mode(&mut self, station: bool, ap: bool) -> bool;

    /// Request an asynchronous scan.
    fn start_scan(&mut self) -> bool;

    /// Whether the last requested scan has finished.
    fn scan_complete(&mut self) -> bool;

    /// Results of the last finished scan. Only meaningful after
    /// [`scan_complete`](Self::scan_complete) returned `true`.
    fn scan_results(&mut self) -> Vec<ScanResult>;

    /// Request association with `target`.
    fn connect(&mut self, target: &SelectedCandidate) -> bool;

    fn connection_status(&mut self) -> ConnectionStatus;

    /// Drop the association and abort any scan in flight.
    fn disconnect(&mut self) -> bool;

    fn start_ap(&mut self, config: &ApConfig) -> bool;

    fn stop_ap(&mut self) -> bool;

    /// Station address, if one is assigned.
    fn current_ip(&self) -> Option<Ipv4Addr>;

    fn apply_power_save(&mut self, _mode: PowerSaveMode) -> bool {
        true
    }

    fn apply_output_power(&mut self, _dbm: f32) -> bool {
        true
    }
}

impl<R: RadioDriver + ?Sized> RadioDriver for Box<R> {
    fn set_mode(&mut self, station: bool, ap: bool) -> bool {
        (**self).set_mode(station, ap)
    }

    fn start_scan(&mut self) -> bool {
        (**self).start_scan()
    }

    fn scan_complete(&mut self) -> bool {
        (**self).scan_complete()
    }

    fn scan_results(&mut self) -> Vec<ScanResult> {
        (**self).scan_results()
    }

    fn connect(&mut self, target: &SelectedCandidate) -> bool {
        (**self).connect(target)
    }

    fn connection_status(&mut self) -> ConnectionStatus {
        (**self).connection_status()
    }

    fn disconnect(&mut self) -> bool {
        (**self).disconnect()
    }

    fn start_ap(&mut self, config: &ApConfig) -> bool {
        (**self).start_ap(config)
    }

    fn stop_ap(&mut self) -> bool {
        (**self).stop_ap()
    }

    fn current_ip(&self) -> Option<Ipv4Addr> {
        (**self).current_ip()
    }

    fn apply_power_save(&mut self, mode: PowerSaveMode) -> bool {
        (**self).apply_power_save(mode)
    }

    fn apply_output_power(&mut self, dbm: f32) -> bool {
        (**self).apply_output_power(dbm)
    }
}
