//! Minimal component host.
//!
//! Components are set up in descending [`setup_priority`] order. A
//! component is only set up once every component before it either reports
//! [`Component::can_proceed`] or failed its own setup, so anything that
//! needs the network waits for the WiFi link.

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::tunnel::TunnelError;
use log::{error, info};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Common setup priorities, higher runs first.
pub mod setup_priority {
    pub const HARDWARE: f32 = 800.0;
    pub const DATA: f32 = 600.0;
    pub const PROCESSOR: f32 = 400.0;
    pub const WIFI: f32 = 250.0;
    pub const AFTER_WIFI: f32 = 200.0;
    pub const AFTER_CONNECTION: f32 = 100.0;
    pub const LATE: f32 = -100.0;
}

/// A unit of firmware driven by [`App`].
pub trait Component {
    fn name(&self) -> &'static str;

    fn setup_priority(&self) -> f32 {
        setup_priority::DATA
    }

    fn setup(&mut self) -> Result<(), AppError>;

    /// Called on every loop iteration once set up.
    fn tick(&mut self) -> Result<(), AppError>;

    /// Whether components after this one may be set up.
    fn can_proceed(&self) -> bool {
        true
    }

    fn dump_config(&self) {}
}

/// Lets the main loop keep a handle on a component the [`App`] drives.
impl<T: Component + ?Sized> Component for Rc<RefCell<T>> {
    fn name(&self) -> &'static str {
        self.borrow().name()
    }

    fn setup_priority(&self) -> f32 {
        self.borrow().setup_priority()
    }

    fn setup(&mut self) -> Result<(), AppError> {
        self.borrow_mut().setup()
    }

    fn tick(&mut self) -> Result<(), AppError> {
        self.borrow_mut().tick()
    }

    fn can_proceed(&self) -> bool {
        self.borrow().can_proceed()
    }

    fn dump_config(&self) {
        self.borrow().dump_config()
    }
}

/// Errors surfaced to the main loop.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Link(LinkError),
    Tunnel(TunnelError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "configuration error: {}", e),
            AppError::Link(e) => write!(f, "link error: {}", e),
            AppError::Tunnel(e) => write!(f, "tunnel error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Link(e) => Some(e),
            AppError::Tunnel(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<LinkError> for AppError {
    fn from(e: LinkError) -> Self {
        AppError::Link(e)
    }
}

impl From<TunnelError> for AppError {
    fn from(e: TunnelError) -> Self {
        AppError::Tunnel(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Ready,
    Failed,
}

struct Slot {
    component: Box<dyn Component>,
    phase: Phase,
}

/// Runs registered components.
#[derive(Default)]
pub struct App {
    slots: Vec<Slot>,
    started: bool,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component. Must be called before the first [`tick`](Self::tick).
    pub fn register(&mut self, component: Box<dyn Component>) {
        self.slots.push(Slot {
            component,
            phase: Phase::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names in setup order.
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.component.name()).collect()
    }

    /// Whether every component has been set up.
    pub fn is_setup_complete(&self) -> bool {
        self.slots.iter().all(|s| s.phase != Phase::Pending)
    }

    /// Whether setup of the named component failed.
    pub fn failed(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.component.name() == name && s.phase == Phase::Failed)
    }

    /// One loop iteration: tick ready components, then set up whatever the
    /// gate allows.
    ///
    /// Setup failures are logged and the component is skipped from then on.
    /// The first tick error is returned after all ready components ran.
    pub fn tick(&mut self) -> Result<(), AppError> {
        if !self.started {
            // Stable sort keeps registration order for equal priorities
            self.slots.sort_by(|a, b| {
                b.component
                    .setup_priority()
                    .total_cmp(&a.component.setup_priority())
            });
            self.started = true;
        }

        let mut first_error = None;
        for slot in self.slots.iter_mut().filter(|s| s.phase == Phase::Ready) {
            if let Err(e) = slot.component.tick() {
                error!("{}: {}", slot.component.name(), e);
                first_error.get_or_insert(e);
            }
        }

        self.advance_setup();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn advance_setup(&mut self) {
        for slot in self.slots.iter_mut() {
            match slot.phase {
                Phase::Failed => continue,
                Phase::Ready => {
                    if !slot.component.can_proceed() {
                        return;
                    }
                }
                Phase::Pending => {
                    info!("Setting up {}", slot.component.name());
                    match slot.component.setup() {
                        Ok(()) => {
                            slot.component.dump_config();
                            slot.phase = Phase::Ready;
                        }
                        Err(e) => {
                            error!("Setup of {} failed: {}", slot.component.name(), e);
                            slot.phase = Phase::Failed;
                            continue;
                        }
                    }
                    if !slot.component.can_proceed() {
                        return;
                    }
                }
            }
        }
    }
}
