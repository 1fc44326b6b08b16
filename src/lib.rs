//! WiFi link management and WireGuard tunnel firmware library.
//!
//! This library contains platform-independent components that can be tested
//! on the host machine without ESP32 hardware. The ESP-IDF radio adapter and
//! NVS storage are behind the `esp32` feature.

pub mod component;
pub mod config;
pub mod link;
pub mod status_server;
pub mod tunnel;
#[cfg(feature = "esp32")]
pub mod wifi;

// Re-export commonly used items
pub use component::{App, AppError, Component};
pub use config::{ApConfig, Candidate, ConfigError, LinkConfig};
pub use link::{LinkDiagnostics, LinkError, LinkManager, LinkState, RadioDriver};
pub use status_server::{StatusBoard, StatusServer, DEFAULT_STATUS_PORT};
pub use tunnel::{PeerLink, Tunnel, TunnelError, TunnelStatus};
