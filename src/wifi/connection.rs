//! WiFi station management.
//!
//! Wraps the ESP-IDF blocking WiFi driver for joining the configured access
//! point.

use crate::config::{WifiConfig, CONNECTION_TIMEOUT_SECS};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::EspError;
use log::{info, warn};
use std::time::{Duration, Instant};

/// Pause between association attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// WiFi connection manager.
pub struct WifiManager<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> WifiManager<'a> {
    /// Create a new WiFi manager.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        Ok(Self { wifi })
    }

    /// Join the access point described by `config`.
    ///
    /// Association is retried until [`CONNECTION_TIMEOUT_SECS`] elapses.
    /// Returns the DHCP-assigned IP address on success.
    pub fn connect(&mut self, config: &WifiConfig) -> Result<String, WifiError> {
        info!("Connecting to WiFi: {}", config.ssid);

        let auth_method = if config.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidSsid)?,
            password: config
                .password
                .expose()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&wifi_config)?;
        self.wifi.start()?;

        let deadline = Instant::now() + Duration::from_secs(CONNECTION_TIMEOUT_SECS);
        loop {
            match self.wifi.connect() {
                Ok(()) => break,
                Err(e) if Instant::now() < deadline => {
                    warn!("WiFi association failed ({:?}), retrying", e);
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(WifiError::ConnectionFailed(e)),
            }
        }

        self.wifi.wait_netif_up().map_err(WifiError::DhcpFailed)?;

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        let ip = format!("{}", ip_info.ip);

        info!("Connected to WiFi, IP: {}", ip);
        Ok(ip)
    }

    /// Disconnect from the current network.
    pub fn disconnect(&mut self) -> Result<(), EspError> {
        info!("Disconnecting from WiFi");
        self.wifi.disconnect()?;
        self.wifi.stop()?;
        Ok(())
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    /// Get current IP address if connected.
    pub fn get_ip(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| format!("{}", info.ip))
    }
}

/// Errors that can occur during WiFi operations.
#[derive(Debug)]
pub enum WifiError {
    /// SSID does not fit the driver's buffer.
    InvalidSsid,
    /// Password does not fit the driver's buffer.
    InvalidPassword,
    /// Failed to associate with the access point before the timeout.
    ConnectionFailed(EspError),
    /// Failed to obtain IP address via DHCP.
    DhcpFailed(EspError),
    /// ESP-IDF error.
    EspError(EspError),
}

impl From<EspError> for WifiError {
    fn from(e: EspError) -> Self {
        Self::EspError(e)
    }
}

impl std::fmt::Display for WifiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::ConnectionFailed(e) => write!(f, "connection failed: {:?}", e),
            Self::DhcpFailed(e) => write!(f, "DHCP failed: {:?}", e),
            Self::EspError(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for WifiError {}
