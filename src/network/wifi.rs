//! ESP32 WiFi network provider.

use super::{NetworkError, NetworkProvider};
use crate::config::{WifiConfig, WifiStatus};
use crate::wifi::WifiManager;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use log::{info, warn};
use std::net::IpAddr;

/// Joins the access point from the resolved device configuration.
pub struct WifiNetwork<'a> {
    wifi: WifiManager<'a>,
    config: WifiConfig,
    status: WifiStatus,
}

impl<'a> WifiNetwork<'a> {
    /// Create a new WiFi network provider.
    ///
    /// # Arguments
    ///
    /// * `modem` - The WiFi/BT modem peripheral
    /// * `sysloop` - The ESP-IDF system event loop
    /// * `config` - Station credentials
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        config: WifiConfig,
    ) -> Result<Self, NetworkError> {
        Ok(Self {
            wifi: WifiManager::new(modem, sysloop)?,
            config,
            status: WifiStatus::Disconnected,
        })
    }
}

impl<'a> NetworkProvider for WifiNetwork<'a> {
    fn connect(&mut self) -> Result<WifiStatus, NetworkError> {
        self.status = WifiStatus::Connecting;
        info!("WiFi status: {}", self.status);

        match self.wifi.connect(&self.config) {
            Ok(ip) => {
                self.status = WifiStatus::Connected { ip };
                info!("WiFi status: {}", self.status);
                Ok(self.status.clone())
            }
            Err(e) => {
                self.status = WifiStatus::Failed {
                    reason: e.to_string(),
                };
                Err(e.into())
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), NetworkError> {
        self.wifi.disconnect()?;
        self.status = WifiStatus::Disconnected;
        Ok(())
    }

    fn status(&self) -> &WifiStatus {
        &self.status
    }

    fn ip_addr(&self) -> Option<IpAddr> {
        let ip = self.wifi.get_ip()?;
        match ip.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("Driver reported unparsable IP '{}': {}", ip, e);
                None
            }
        }
    }
}
