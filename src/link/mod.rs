//! WiFi link management.
//!
//! This module contains:
//! - [`state`]: Link states and the allowed transitions
//! - [`candidates`]: Candidate credentials and BSSID priorities
//! - [`scan`]: Scan results and candidate ranking
//! - [`radio`]: Radio driver abstraction
//! - [`clock`]: Millisecond clocks
//! - [`manager`]: The link state machine
//! - [`readiness`]: Conditions over a manager handle
//! - [`diagnostics`]: Read-only snapshots
//! - [`sim`]: Scripted radio for host runs and tests
//!
//! Everything here is host-testable; the ESP-IDF radio adapter lives in
//! [`crate::wifi`].

mod candidates;
mod clock;
mod diagnostics;
mod manager;
mod radio;
mod readiness;
mod scan;
mod sim;
mod state;

#[cfg(test)]
mod tests;

pub use candidates::{BssidPriority, CandidateStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::LinkDiagnostics;
pub use manager::{LinkError, LinkManager, DEFAULT_AP_IP};
pub use radio::{ConnectionStatus, RadioDriver};
pub use readiness::{CanProceed, Condition, IsConnected, LinkStatus, Not};
pub use scan::{select, signal_score, ScanResult, SelectedCandidate};
pub use sim::{SimCounters, SimNetwork, SimRadio};
pub use state::LinkState;
