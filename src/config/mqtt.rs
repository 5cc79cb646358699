//! MQTT broker connection settings.

use super::{ConfigError, Secret};
use rand_core::{OsRng, RngCore};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default plaintext MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Shortest keep-alive we accept; anything lower floods the broker with pings.
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Maximum length of an MQTT UTF-8 string (user name, password).
pub const MAX_MQTT_STRING_LEN: usize = 65_535;

/// Client id length every MQTT 3.1.1 broker must accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Prefix of generated client ids.
pub const CLIENT_ID_PREFIX: &str = "feed-node-";

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Broker host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
}

impl BrokerAddr {
    /// Create a broker address, validating the host.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        if port == 0 {
            return Err(ConfigError::InvalidPort("0".into()));
        }
        validate_host(&host)?;
        Ok(Self { host, port })
    }

    /// Parse `host`, `host:port`, `[v6addr]:port`, a bare IPv6 address, or
    /// an `mqtt://` / `tcp://` URL.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, ConfigError> {
        let (host, port) = split_server(input)?;
        Self::new(host, port.unwrap_or(default_port))
    }

    /// Port written into a server string, if any.
    pub fn explicit_port(input: &str) -> Result<Option<u16>, ConfigError> {
        split_server(input).map(|(_, port)| port)
    }

    /// Whether the host is an IPv6 literal.
    pub fn is_ipv6(&self) -> bool {
        matches!(self.host.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
    }
}

impl fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BrokerAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, DEFAULT_MQTT_PORT)
    }
}

/// Split a server string into host and optional port.
fn split_server(input: &str) -> Result<(&str, Option<u16>), ConfigError> {
    let mut s = input.trim();
    for scheme in ["mqtt://", "tcp://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest;
        }
    }
    if s.contains("://") {
        return Err(ConfigError::InvalidServer(format!(
            "unsupported scheme in '{}'",
            input
        )));
    }
    let s = s.trim_end_matches('/');
    if s.is_empty() {
        return Err(ConfigError::InvalidServer("address is empty".into()));
    }

    // Bracketed IPv6, optionally with port
    if let Some(rest) = s.strip_prefix('[') {
        let (addr, after) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::InvalidServer(format!("unclosed '[' in '{}'", s)))?;
        let port = match after {
            "" => None,
            p => Some(parse_port(p.strip_prefix(':').ok_or_else(|| {
                ConfigError::InvalidServer(format!("unexpected '{}' after address", p))
            })?)?),
        };
        return Ok((addr, port));
    }

    // Bare IPv6 literal has several colons
    if s.matches(':').count() > 1 {
        return Ok((s, None));
    }

    match s.split_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((s, None)),
    }
}

/// Parse a port number in 1..=65535.
pub fn parse_port(s: &str) -> Result<u16, ConfigError> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidPort(s.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Check that `host` is an IP literal or an RFC 1123 host name.
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidServer("host is empty".into()));
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if host.len() > MAX_HOSTNAME_LEN {
        return Err(ConfigError::InvalidServer(format!(
            "host name too long: {} bytes (max {})",
            host.len(),
            MAX_HOSTNAME_LEN
        )));
    }
    // A single trailing dot marks a fully qualified name
    let name = host.strip_suffix('.').unwrap_or(host);
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(ConfigError::InvalidServer(format!(
                "bad label length in '{}'",
                host
            )));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(ConfigError::InvalidServer(format!(
                "invalid character in '{}'",
                host
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ConfigError::InvalidServer(format!(
                "label starts or ends with '-' in '{}'",
                host
            )));
        }
    }
    Ok(())
}

/// Check an MQTT client identifier.
pub fn validate_client_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::InvalidClientId("empty".into()));
    }
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(ConfigError::InvalidClientId(format!(
            "{} chars (max {})",
            id.len(),
            MAX_CLIENT_ID_LEN
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(ConfigError::InvalidClientId(format!(
            "'{}' has characters outside [0-9A-Za-z_-]",
            id
        )));
    }
    Ok(())
}

/// Generate a random client id, `feed-node-` plus 8 hex digits.
pub fn generate_client_id() -> String {
    format!("{}{:08x}", CLIENT_ID_PREFIX, OsRng.next_u32())
}

/// Parse a keep-alive interval in whole seconds.
pub fn parse_keep_alive(s: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidKeepAlive(s.to_string()))?;
    if !(MIN_KEEP_ALIVE_SECS..=u16::MAX as u64).contains(&secs) {
        return Err(ConfigError::InvalidKeepAlive(format!(
            "{}s (allowed {}..={})",
            secs,
            MIN_KEEP_ALIVE_SECS,
            u16::MAX
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Everything needed to open an MQTT session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    /// Broker address.
    pub server: BrokerAddr,
    /// User login; empty for anonymous access.
    pub user: String,
    /// Password; only valid together with a user.
    pub password: Secret,
    /// Client identifier presented in CONNECT.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
}

impl MqttConfig {
    /// Create a configuration with a generated client id and default keep-alive.
    pub fn new(
        server: BrokerAddr,
        user: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            server,
            user: user.into(),
            password: password.into(),
            client_id: generate_client_id(),
            keep_alive: DEFAULT_KEEP_ALIVE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the client id.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Result<Self, ConfigError> {
        self.client_id = id.into();
        self.validate()?;
        Ok(self)
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Result<Self, ConfigError> {
        self.keep_alive = keep_alive;
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.server.host)?;
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort("0".into()));
        }
        if self.user.len() > MAX_MQTT_STRING_LEN {
            return Err(ConfigError::CredentialTooLong {
                field: "user",
                len: self.user.len(),
                max: MAX_MQTT_STRING_LEN,
            });
        }
        if self.password.len() > MAX_MQTT_STRING_LEN {
            return Err(ConfigError::CredentialTooLong {
                field: "password",
                len: self.password.len(),
                max: MAX_MQTT_STRING_LEN,
            });
        }
        if self.user.is_empty() && !self.password.is_empty() {
            return Err(ConfigError::PasswordWithoutUser);
        }
        validate_client_id(&self.client_id)?;
        let secs = self.keep_alive.as_secs();
        if !(MIN_KEEP_ALIVE_SECS..=u16::MAX as u64).contains(&secs) {
            return Err(ConfigError::InvalidKeepAlive(format!("{}s", secs)));
        }
        Ok(())
    }

    /// Whether the session is opened without credentials.
    pub fn is_anonymous(&self) -> bool {
        self.user.is_empty()
    }
}
