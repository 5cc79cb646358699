use std::fmt;

/// Errors that can occur while building or validating device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was not provided by any layer.
    Missing(&'static str),
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// MQTT server address is not a valid host or host:port.
    InvalidServer(String),
    /// MQTT port is not a number in 1..=65535.
    InvalidPort(String),
    /// MQTT user or password exceeds the protocol string limit.
    CredentialTooLong { field: &'static str, len: usize, max: usize },
    /// MQTT password given without a user name.
    PasswordWithoutUser,
    /// MQTT client identifier is unusable.
    InvalidClientId(String),
    /// Keep-alive interval outside the accepted range.
    InvalidKeepAlive(String),
    /// Feed topic is malformed.
    InvalidTopic(String),
    /// Invalid data format during deserialization.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting {}", key),
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidServer(msg) => write!(f, "invalid MQTT server: {}", msg),
            Self::InvalidPort(port) => write!(f, "invalid MQTT port: {}", port),
            Self::CredentialTooLong { field, len, max } => {
                write!(f, "MQTT {} too long: {} bytes (max {})", field, len, max)
            }
            Self::PasswordWithoutUser => write!(f, "MQTT password requires a user name"),
            Self::InvalidClientId(msg) => write!(f, "invalid MQTT client id: {}", msg),
            Self::InvalidKeepAlive(value) => write!(f, "invalid keep-alive: {}", value),
            Self::InvalidTopic(msg) => write!(f, "invalid feed topic: {}", msg),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidFormat(e.to_string())
    }
}
