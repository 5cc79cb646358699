//! Feed node firmware library.
//!
//! WiFi and MQTT credentials, the broker session that publishes to the
//! device feed, and the supporting network glue. Everything outside the
//! `esp32`-gated modules is platform-independent and tested on the host.

pub mod config;
pub mod console;
pub mod mqtt;
pub mod network;
#[cfg(not(feature = "esp32"))]
pub mod persistence_host;
#[cfg(feature = "esp32")]
pub mod wifi;

// Re-export commonly used items
pub use config::{
    ConfigError, DeviceConfig, FeedTopic, MqttConfig, PartialConfig, Secret, WifiConfig,
    WifiStatus,
};
pub use console::{ConsoleCommand, HELP_TEXT};
pub use mqtt::{FeedClient, FeedEventLoop, FeedOptions, MqttError, MqttStatus, QoS};
pub use network::{NetworkError, NetworkProvider, NodeStats, StatsServer};
