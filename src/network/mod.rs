//! Link bring-up for the feed node.
//!
//! The MQTT session needs an IP route to the broker before it starts. On the
//! device (`esp32` feature) that means joining the configured access point.
//! On a host the OS owns the link, so only the route toward the broker is
//! checked.
//!
//! ```ignore
//! #[cfg(feature = "esp32")]
//! let mut network = WifiNetwork::new(peripherals.modem, sysloop, config.wifi.clone())?;
//! #[cfg(not(feature = "esp32"))]
//! let mut network = HostNetwork::for_broker(&config.mqtt.server);
//!
//! let status = network.connect()?;
//! stats.set_network_status(status.as_status_string());
//! ```

use crate::config::WifiStatus;
use std::fmt;
use std::net::IpAddr;

#[cfg(feature = "esp32")]
mod wifi;

#[cfg(not(feature = "esp32"))]
mod host;

mod stats_server;

#[cfg(feature = "esp32")]
pub use wifi::WifiNetwork;

#[cfg(not(feature = "esp32"))]
pub use host::HostNetwork;

pub use stats_server::{MqttStats, NodeStats, QueueStats, StatsServer, DEFAULT_STATS_PORT};

/// A link the node can bring up before talking to the broker.
pub trait NetworkProvider: Send {
    /// Bring the link up and report where it ended.
    ///
    /// A link that came up without a usable route is reported as
    /// [`WifiStatus::Failed`], not as an error; the MQTT client keeps
    /// retrying on its own.
    fn connect(&mut self) -> Result<WifiStatus, NetworkError>;

    /// Take the link down.
    fn disconnect(&mut self) -> Result<(), NetworkError>;

    fn status(&self) -> &WifiStatus;

    /// Local address, if the link has one.
    fn ip_addr(&self) -> Option<IpAddr>;
}

/// Failure to bring the link up at all.
#[derive(Debug)]
pub enum NetworkError {
    /// WiFi driver or association failure.
    #[cfg(feature = "esp32")]
    Wifi(crate::wifi::WifiError),
    /// Socket setup failed on the host.
    Io(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "esp32")]
            Self::Wifi(e) => write!(f, "WiFi: {}", e),
            Self::Io(e) => write!(f, "network I/O: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "esp32")]
            Self::Wifi(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<crate::wifi::WifiError> for NetworkError {
    fn from(e: crate::wifi::WifiError) -> Self {
        Self::Wifi(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NetworkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Wifi(e.into())
    }
}
