//! ESP32 WiFi driver and credential storage.
//!
//! # Components
//!
//! - [`connection`] - ESP-IDF WiFi station wrapper
//! - [`storage`] - NVS persistence for the device configuration
//!
//! Credential types and validation live in [`crate::config`] so they can be
//! tested on the host.

mod connection;
mod storage;

pub use connection::{WifiError, WifiManager};
pub use storage::{clear_device_config, init_nvs, load_device_config, save_device_config};
