use std::fmt;
use std::time::Duration;

/// Broker session state as seen by the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttStatus {
    /// Not started, or stopped.
    Disconnected,
    /// CONNECT sent, waiting for CONNACK.
    Connecting,
    /// Session established.
    Connected,
    /// Last attempt failed; waiting `delay` before attempt `attempt`.
    Backoff {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
}

impl MqttStatus {
    /// Status as reported in logs and the stats endpoint.
    pub fn as_status_string(&self) -> String {
        match self {
            Self::Disconnected => "disconnected".to_string(),
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Backoff {
                attempt,
                delay,
                reason,
            } => format!("backoff:{}:{}ms:{}", attempt, delay.as_millis(), reason),
        }
    }
}

impl fmt::Display for MqttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_status_string())
    }
}
