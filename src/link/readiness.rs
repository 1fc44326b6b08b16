//! Readiness conditions over a link manager handle.
//!
//! Conditions take the subject they inspect as an argument, so callers pass
//! the manager they own instead of reaching for a global.
//!
//! ```
//! use wireguard_esp32::config::{Candidate, LinkConfig};
//! use wireguard_esp32::link::{Condition, IsConnected, LinkManager, ManualClock, SimRadio};
//!
//! let config = LinkConfig::with_candidates(vec![Candidate::open("home").unwrap()]);
//! let manager = LinkManager::new(config, SimRadio::new(vec![]), ManualClock::new(0));
//! assert!(!IsConnected.check(&manager));
//! ```

use super::clock::Clock;
use super::manager::LinkManager;
use super::radio::RadioDriver;

/// A yes/no question about `T`.
pub trait Condition<T: ?Sized> {
    fn check(&self, subject: &T) -> bool;
}

/// Link status as seen by conditions.
pub trait LinkStatus {
    fn is_connected(&self) -> bool;
    fn can_proceed(&self) -> bool;
}

impl<R: RadioDriver, C: Clock> LinkStatus for LinkManager<R, C> {
    fn is_connected(&self) -> bool {
        LinkManager::is_connected(self)
    }

    fn can_proceed(&self) -> bool {
        LinkManager::can_proceed(self)
    }
}

/// True while associated with an access point.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsConnected;

impl<T: LinkStatus + ?Sized> Condition<T> for IsConnected {
    fn check(&self, subject: &T) -> bool {
        subject.is_connected()
    }
}

/// True when network-dependent work may start (connected, or serving our
/// own AP).
#[derive(Debug, Clone, Copy, Default)]
pub struct CanProceed;

impl<T: LinkStatus + ?Sized> Condition<T> for CanProceed {
    fn check(&self, subject: &T) -> bool {
        subject.can_proceed()
    }
}

/// Negates another condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Not<C>(pub C);

impl<T: ?Sized, C: Condition<T>> Condition<T> for Not<C> {
    fn check(&self, subject: &T) -> bool {
        !self.0.check(subject)
    }
}
