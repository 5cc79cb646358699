//! MQTT feed publishing.
//!
//! This module connects to the configured broker with `rumqttc` and
//! publishes to the device feed.
//!
//! # Components
//!
//! - [`client`] - feed client and its event loop
//! - [`backoff`] - reconnect delay
//! - [`queue`] - publishes held while the broker is unreachable
//! - [`status`] - session state reported to logs and stats

mod backoff;
mod client;
mod queue;
mod status;

pub use backoff::{Backoff, INITIAL_BACKOFF, MAX_BACKOFF};
pub use client::{FeedClient, FeedEventLoop, FeedOptions, IncomingMessage, PublishOutcome};
pub use queue::{PublishQueue, QueuedPublish, DEFAULT_QUEUE_CAPACITY, QUEUE_MESSAGE_TTL};
pub use status::MqttStatus;

use crate::config::ConfigError;
use rumqttc::{ConnectReturnCode, ConnectionError};
use std::fmt;
use std::str::FromStr;

/// Delivery guarantee for a publish or subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl FromStr for QoS {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Self::AtMostOnce),
            "1" => Ok(Self::AtLeastOnce),
            "2" => Ok(Self::ExactlyOnce),
            other => Err(ConfigError::InvalidFormat(format!("unknown QoS: {}", other))),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Errors that can occur while talking to the broker.
#[derive(Debug)]
pub enum MqttError {
    /// Network or protocol failure reaching the broker.
    Connection(String),
    /// Broker rejected the user name/password or the client is not authorized.
    Authentication(String),
    /// Request could not be handed to the client event loop.
    Client(String),
    /// Broker unreachable and the offline queue is full.
    QueueFull { capacity: usize },
    /// Topic or filter is malformed.
    InvalidTopic(ConfigError),
}

impl MqttError {
    /// Whether retrying with the same credentials is pointless.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::Authentication(msg) => write!(f, "authentication failed: {}", msg),
            Self::Client(msg) => write!(f, "client error: {}", msg),
            Self::QueueFull { capacity } => {
                write!(f, "broker unreachable and queue full ({} messages)", capacity)
            }
            Self::InvalidTopic(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MqttError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidTopic(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for MqttError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::ConnectionRefused(
                code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
            ) => Self::Authentication(format!("broker refused connection: {:?}", code)),
            ConnectionError::ConnectionRefused(code) => {
                Self::Connection(format!("broker refused connection: {:?}", code))
            }
            other => Self::Connection(other.to_string()),
        }
    }
}

impl From<rumqttc::ClientError> for MqttError {
    fn from(e: rumqttc::ClientError) -> Self {
        Self::Client(e.to_string())
    }
}

impl From<ConfigError> for MqttError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidTopic(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_parse() {
        assert_eq!("0".parse::<QoS>().unwrap(), QoS::AtMostOnce);
        assert_eq!(" 1 ".parse::<QoS>().unwrap(), QoS::AtLeastOnce);
        assert_eq!("2".parse::<QoS>().unwrap(), QoS::ExactlyOnce);
        assert!("3".parse::<QoS>().is_err());
        assert_eq!(QoS::default(), QoS::AtLeastOnce);
        assert_eq!(QoS::ExactlyOnce.to_string(), "2");
    }

    #[test]
    fn test_refused_credentials_are_authentication_errors() {
        let err = MqttError::from(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword,
        ));
        assert!(err.is_authentication());

        let err = MqttError::from(ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized,
        ));
        assert!(err.is_authentication());
    }

    #[test]
    fn test_other_refusals_are_connection_errors() {
        let err = MqttError::from(ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert!(matches!(err, MqttError::Connection(_)));
        assert!(!err.is_authentication());
    }

    #[test]
    fn test_display() {
        let err = MqttError::QueueFull { capacity: 32 };
        assert_eq!(
            err.to_string(),
            "broker unreachable and queue full (32 messages)"
        );
        let err = MqttError::from(ConfigError::InvalidTopic("topic is empty".into()));
        assert_eq!(err.to_string(), "invalid feed topic: topic is empty");
    }
}
