//! ESP-IDF WiFi driver and storage.
//!
//! # Components
//!
//! - [`driver`] - [`EspRadio`], the [`RadioDriver`](crate::link::RadioDriver)
//!   on top of `EspWifi`
//! - [`storage`] - NVS persistence for station credentials
//!
//! The link logic itself is platform-independent and lives in
//! [`crate::link`].

mod driver;
mod storage;

pub use driver::EspRadio;
pub use storage::{clear_candidates, init_nvs, load_candidates, save_candidates, StorageError};
