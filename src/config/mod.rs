//! Device configuration.
//!
//! Credentials and broker settings the node reads once at startup and hands,
//! unmodified, to the WiFi and MQTT layers.
//!
//! # Components
//!
//! - [`WifiConfig`] - WiFi station credentials
//! - [`MqttConfig`] / [`BrokerAddr`] - broker address, login and session settings
//! - [`FeedTopic`] - the `<namespace>/<topic>` feed to publish to
//! - [`PartialConfig`] / [`DeviceConfig`] - layered loading (builtin, stored, environment)
//!
//! Passwords are held in [`Secret`], which never prints its value and is
//! zeroed on drop.

mod device;
mod error;
mod feed;
mod mqtt;
mod secret;
mod wifi;

pub use device::{
    DeviceConfig, PartialConfig, KEY_MQTT_CLIENT_ID, KEY_MQTT_FEED, KEY_MQTT_KEEP_ALIVE,
    KEY_MQTT_PASSWORD, KEY_MQTT_PORT, KEY_MQTT_SERVER, KEY_MQTT_USER, KEY_WIFI_PASSWORD,
    KEY_WIFI_SSID,
};
pub use error::ConfigError;
pub use feed::{validate_publish_topic, validate_topic_filter, FeedTopic, MAX_TOPIC_LEN};
pub use mqtt::{
    generate_client_id, BrokerAddr, MqttConfig, DEFAULT_KEEP_ALIVE, DEFAULT_MQTT_PORT,
    MAX_CLIENT_ID_LEN,
};
pub use secret::{Secret, REDACTED};
pub use wifi::{
    WifiConfig, WifiStatus, CONNECTION_TIMEOUT_SECS, MAX_PASSWORD_LEN, MAX_SSID_LEN,
    MIN_PASSWORD_LEN,
};
