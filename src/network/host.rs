//! Host network provider.
//!
//! On host systems the OS owns the WiFi/Ethernet link. This provider only
//! reports which local address routes toward the MQTT broker.

use super::{NetworkError, NetworkProvider};
use crate::config::{BrokerAddr, WifiStatus};
use log::{info, warn};
use std::net::{IpAddr, UdpSocket};

/// Probe target when no broker is known.
const FALLBACK_PROBE: (&str, u16) = ("8.8.8.8", 80);

/// Host network provider.
pub struct HostNetwork {
    probe: Option<BrokerAddr>,
    status: WifiStatus,
    ip_addr: Option<IpAddr>,
}

impl HostNetwork {
    /// Create a provider that probes the default route.
    pub fn new() -> Self {
        Self {
            probe: None,
            status: WifiStatus::Disconnected,
            ip_addr: None,
        }
    }

    /// Create a provider that probes the route toward `broker`.
    pub fn for_broker(broker: &BrokerAddr) -> Self {
        Self {
            probe: Some(broker.clone()),
            ..Self::new()
        }
    }

    fn probe_socket(&self) -> std::io::Result<UdpSocket> {
        let v6 = self.probe.as_ref().map_or(false, BrokerAddr::is_ipv6);
        UdpSocket::bind(if v6 { "[::]:0" } else { "0.0.0.0:0" })
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProvider for HostNetwork {
    fn connect(&mut self) -> Result<WifiStatus, NetworkError> {
        let (host, port) = match &self.probe {
            Some(broker) => (broker.host.as_str(), broker.port),
            None => FALLBACK_PROBE,
        };

        // "Connecting" a UDP socket only selects a route; no packet is sent
        let socket = self.probe_socket()?;
        let route = socket
            .connect((host, port))
            .and_then(|()| socket.local_addr());

        self.status = match route {
            Ok(local) => {
                let ip = local.ip();
                info!("Host network ready, local IP {} routes to {}", ip, host);
                self.ip_addr = Some(ip);
                WifiStatus::Connected { ip: ip.to_string() }
            }
            Err(e) => {
                warn!("No route to {} yet: {}", host, e);
                self.ip_addr = None;
                WifiStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        Ok(self.status.clone())
    }

    fn disconnect(&mut self) -> Result<(), NetworkError> {
        self.ip_addr = None;
        self.status = WifiStatus::Disconnected;
        Ok(())
    }

    fn status(&self) -> &WifiStatus {
        &self.status
    }

    fn ip_addr(&self) -> Option<IpAddr> {
        self.ip_addr
    }
}
