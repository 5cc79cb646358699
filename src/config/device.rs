//! Device configuration assembled from layers.
//!
//! Settings come from three places, lowest priority first:
//!
//! 1. values baked in at compile time (`option_env!`)
//! 2. the persisted store (JSON file on host, NVS on ESP32)
//! 3. the process environment at startup
//!
//! Each layer is a [`PartialConfig`]; later layers override earlier ones field
//! by field, and [`PartialConfig::build`] validates the result into a
//! [`DeviceConfig`].

use super::mqtt::{parse_keep_alive, parse_port, BrokerAddr, MqttConfig, DEFAULT_MQTT_PORT};
use super::{ConfigError, FeedTopic, Secret, WifiConfig};
use serde::{Deserialize, Serialize};

pub const KEY_WIFI_SSID: &str = "WIFI_SSID";
pub const KEY_WIFI_PASSWORD: &str = "WIFI_PASSWORD";
pub const KEY_MQTT_SERVER: &str = "MQTT_SERVER";
pub const KEY_MQTT_PORT: &str = "MQTT_PORT";
pub const KEY_MQTT_USER: &str = "MQTT_USER";
pub const KEY_MQTT_PASSWORD: &str = "MQTT_PASSWORD";
pub const KEY_MQTT_CLIENT_ID: &str = "MQTT_CLIENT_ID";
pub const KEY_MQTT_KEEP_ALIVE: &str = "MQTT_KEEP_ALIVE";
pub const KEY_MQTT_FEED: &str = "MQTT_FEED";

/// One configuration layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_password: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_password: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_client_id: Option<String>,
    /// Keep-alive in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_keep_alive: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,
}

impl PartialConfig {
    /// Values compiled into the binary.
    ///
    /// Build with e.g. `WIFI_SSID=home MQTT_SERVER=broker.local cargo build`.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            let value = match key {
                KEY_WIFI_SSID => option_env!("WIFI_SSID"),
                KEY_WIFI_PASSWORD => option_env!("WIFI_PASSWORD"),
                KEY_MQTT_SERVER => option_env!("MQTT_SERVER"),
                KEY_MQTT_PORT => option_env!("MQTT_PORT"),
                KEY_MQTT_USER => option_env!("MQTT_USER"),
                KEY_MQTT_PASSWORD => option_env!("MQTT_PASSWORD"),
                KEY_MQTT_CLIENT_ID => option_env!("MQTT_CLIENT_ID"),
                KEY_MQTT_KEEP_ALIVE => option_env!("MQTT_KEEP_ALIVE"),
                KEY_MQTT_FEED => option_env!("MQTT_FEED"),
                _ => None,
            };
            value.map(str::to_string)
        })
    }

    /// Values from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read every key through `lookup`.
    ///
    /// An empty value counts as unset, except for the user and the two
    /// passwords where it explicitly selects "none" (open WiFi, anonymous
    /// MQTT).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            wifi_ssid: non_empty(KEY_WIFI_SSID),
            wifi_password: lookup(KEY_WIFI_PASSWORD).map(Secret::from),
            mqtt_server: non_empty(KEY_MQTT_SERVER),
            mqtt_port: non_empty(KEY_MQTT_PORT)
                .map(|p| parse_port(&p))
                .transpose()?,
            mqtt_user: lookup(KEY_MQTT_USER),
            mqtt_password: lookup(KEY_MQTT_PASSWORD).map(Secret::from),
            mqtt_client_id: non_empty(KEY_MQTT_CLIENT_ID),
            mqtt_keep_alive: non_empty(KEY_MQTT_KEEP_ALIVE)
                .map(|k| parse_keep_alive(&k).map(|d| d.as_secs()))
                .transpose()?,
            feed: non_empty(KEY_MQTT_FEED),
        })
    }

    /// Parse a persisted layer.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize for persistence. Contains secrets in plaintext.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    ///
    /// A server string carrying its own port in `other` also clears the
    /// port setting of `self`.
    pub fn merge(mut self, other: PartialConfig) -> PartialConfig {
        let server_has_port = other
            .mqtt_server
            .as_deref()
            .map_or(false, |s| matches!(BrokerAddr::explicit_port(s), Ok(Some(_))));
        if server_has_port {
            self.mqtt_port = None;
        }

        PartialConfig {
            wifi_ssid: other.wifi_ssid.or(self.wifi_ssid),
            wifi_password: other.wifi_password.or(self.wifi_password),
            mqtt_server: other.mqtt_server.or(self.mqtt_server),
            mqtt_port: other.mqtt_port.or(self.mqtt_port),
            mqtt_user: other.mqtt_user.or(self.mqtt_user),
            mqtt_password: other.mqtt_password.or(self.mqtt_password),
            mqtt_client_id: other.mqtt_client_id.or(self.mqtt_client_id),
            mqtt_keep_alive: other.mqtt_keep_alive.or(self.mqtt_keep_alive),
            feed: other.feed.or(self.feed),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == PartialConfig::default()
    }

    /// Validate into a complete device configuration.
    pub fn build(&self) -> Result<DeviceConfig, ConfigError> {
        let ssid = self
            .wifi_ssid
            .clone()
            .ok_or(ConfigError::Missing(KEY_WIFI_SSID))?;
        let wifi = WifiConfig::new(ssid, self.wifi_password.clone().unwrap_or_default())?;

        let server = self
            .mqtt_server
            .as_deref()
            .ok_or(ConfigError::Missing(KEY_MQTT_SERVER))?;
        let mut server = BrokerAddr::parse(server, DEFAULT_MQTT_PORT)?;
        // An explicit port setting beats one embedded in the server string
        if let Some(port) = self.mqtt_port {
            server = BrokerAddr::new(server.host, port)?;
        }

        let mut mqtt = MqttConfig::new(
            server,
            self.mqtt_user.clone().unwrap_or_default(),
            self.mqtt_password.clone().unwrap_or_default(),
        )?;
        if let Some(id) = &self.mqtt_client_id {
            mqtt = mqtt.with_client_id(id.clone())?;
        }
        if let Some(secs) = self.mqtt_keep_alive {
            mqtt = mqtt.with_keep_alive(std::time::Duration::from_secs(secs))?;
        }

        let feed = FeedTopic::new(
            self.feed
                .clone()
                .ok_or(ConfigError::Missing(KEY_MQTT_FEED))?,
        )?;

        Ok(DeviceConfig { wifi, mqtt, feed })
    }
}

impl From<&DeviceConfig> for PartialConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            wifi_ssid: Some(config.wifi.ssid.clone()),
            wifi_password: Some(config.wifi.password.clone()),
            mqtt_server: Some(config.mqtt.server.host.clone()),
            mqtt_port: Some(config.mqtt.server.port),
            mqtt_user: Some(config.mqtt.user.clone()),
            mqtt_password: Some(config.mqtt.password.clone()),
            mqtt_client_id: Some(config.mqtt.client_id.clone()),
            mqtt_keep_alive: Some(config.mqtt.keep_alive.as_secs()),
            feed: Some(config.feed.to_string()),
        }
    }
}

/// Everything the node needs at startup: WiFi credentials, broker session
/// settings, and the feed to publish to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub feed: FeedTopic,
}

impl DeviceConfig {
    /// Resolve builtin < `stored` < environment.
    pub fn load(stored: Option<PartialConfig>) -> Result<Self, ConfigError> {
        Self::resolve(PartialConfig::builtin()?, stored, PartialConfig::from_env()?)
    }

    /// Stack the three layers, lowest priority first, and validate.
    pub fn resolve(
        builtin: PartialConfig,
        stored: Option<PartialConfig>,
        env: PartialConfig,
    ) -> Result<Self, ConfigError> {
        let mut layers = builtin;
        if let Some(stored) = stored {
            layers = layers.merge(stored);
        }
        layers.merge(env).build()
    }

    /// One-line summary that is safe to log.
    pub fn redacted(&self) -> String {
        format!(
            "wifi_ssid={} wifi_password={} mqtt_server={} mqtt_user={} mqtt_password={} client_id={} keep_alive={}s feed={}",
            self.wifi.ssid,
            if self.wifi.is_open() { "(none)" } else { super::REDACTED },
            self.mqtt.server,
            if self.mqtt.is_anonymous() { "(anonymous)" } else { self.mqtt.user.as_str() },
            if self.mqtt.password.is_empty() { "(none)" } else { super::REDACTED },
            self.mqtt.client_id,
            self.mqtt.keep_alive.as_secs(),
            self.feed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn full_layer() -> PartialConfig {
        PartialConfig::from_lookup(lookup_from(&[
            ("WIFI_SSID", "YourWiFiNetwork"),
            ("WIFI_PASSWORD", "YourWiFiPassword"),
            ("MQTT_SERVER", "broker.local"),
            ("MQTT_USER", "YourMQTTuserLogin"),
            ("MQTT_PASSWORD", "MQTTpassword"),
            ("MQTT_FEED", "user/topic"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_build_full_layer() {
        let config = full_layer().build().unwrap();
        assert_eq!(config.wifi.ssid, "YourWiFiNetwork");
        assert_eq!(config.wifi.password.expose(), "YourWiFiPassword");
        assert_eq!(config.mqtt.server.host, "broker.local");
        assert_eq!(config.mqtt.server.port, DEFAULT_MQTT_PORT);
        assert_eq!(config.mqtt.user, "YourMQTTuserLogin");
        assert_eq!(config.mqtt.password.expose(), "MQTTpassword");
        assert_eq!(config.feed.as_str(), "user/topic");
    }

    #[test]
    fn test_missing_required_keys() {
        let mut layer = full_layer();
        layer.wifi_ssid = None;
        assert_eq!(layer.build(), Err(ConfigError::Missing(KEY_WIFI_SSID)));

        let mut layer = full_layer();
        layer.mqtt_server = None;
        assert_eq!(layer.build(), Err(ConfigError::Missing(KEY_MQTT_SERVER)));

        let mut layer = full_layer();
        layer.feed = None;
        assert_eq!(layer.build(), Err(ConfigError::Missing(KEY_MQTT_FEED)));
    }

    #[test]
    fn test_empty_values_are_unset_for_required_keys() {
        let layer = PartialConfig::from_lookup(lookup_from(&[
            ("WIFI_SSID", ""),
            ("MQTT_SERVER", "  "),
            ("MQTT_FEED", ""),
        ]))
        .unwrap();
        assert!(layer.wifi_ssid.is_none());
        assert!(layer.mqtt_server.is_none());
        assert!(layer.feed.is_none());
    }

    #[test]
    fn test_empty_passwords_mean_open_and_anonymous() {
        let layer = PartialConfig::from_lookup(lookup_from(&[
            ("WIFI_SSID", "Cafe"),
            ("WIFI_PASSWORD", ""),
            ("MQTT_SERVER", "10.0.0.2"),
            ("MQTT_USER", ""),
            ("MQTT_PASSWORD", ""),
            ("MQTT_FEED", "cafe/door"),
        ]))
        .unwrap();
        let config = layer.build().unwrap();
        assert!(config.wifi.is_open());
        assert!(config.mqtt.is_anonymous());
    }

    #[test]
    fn test_invalid_port_in_lookup() {
        let result = PartialConfig::from_lookup(lookup_from(&[("MQTT_PORT", "http")]));
        assert!(matches!(result, Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn test_port_key_overrides_server_port() {
        let mut layer = full_layer();
        layer.mqtt_server = Some("broker.local:1884".into());
        assert_eq!(layer.build().unwrap().mqtt.server.port, 1884);

        layer.mqtt_port = Some(8883);
        assert_eq!(layer.build().unwrap().mqtt.server.port, 8883);
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let base = full_layer();
        let overlay = PartialConfig {
            mqtt_server: Some("override.local".into()),
            feed: Some("other/feed".into()),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.mqtt_server.as_deref(), Some("override.local"));
        assert_eq!(merged.feed.as_deref(), Some("other/feed"));
        assert_eq!(merged.wifi_ssid.as_deref(), Some("YourWiFiNetwork"));
    }

    #[test]
    fn test_server_port_beats_lower_layer_port_key() {
        let stored = PartialConfig {
            mqtt_server: Some("old.local".into()),
            mqtt_port: Some(1884),
            ..Default::default()
        };
        let env = PartialConfig {
            mqtt_server: Some("new.local:8883".into()),
            ..Default::default()
        };
        let merged = full_layer().merge(stored).merge(env);
        let server = merged.build().unwrap().mqtt.server;
        assert_eq!(server.host, "new.local");
        assert_eq!(server.port, 8883);
    }

    #[test]
    fn test_lower_layer_port_key_kept_for_bare_server() {
        let stored = PartialConfig {
            mqtt_port: Some(1884),
            ..Default::default()
        };
        let env = PartialConfig {
            mqtt_server: Some("new.local".into()),
            ..Default::default()
        };
        let server = full_layer().merge(stored).merge(env).build().unwrap().mqtt.server;
        assert_eq!(server.to_string(), "new.local:1884");
    }

    #[test]
    fn test_resolve_layer_precedence() {
        let builtin = full_layer();
        let stored = PartialConfig {
            wifi_ssid: Some("StoredNet".into()),
            mqtt_server: Some("stored.local".into()),
            feed: Some("stored/feed".into()),
            ..Default::default()
        };
        let env = PartialConfig::from_lookup(lookup_from(&[
            ("MQTT_SERVER", "env.local:1885"),
            ("MQTT_USER", ""),
            ("MQTT_PASSWORD", ""),
        ]))
        .unwrap();

        let config = DeviceConfig::resolve(builtin.clone(), Some(stored), env).unwrap();
        // builtin only
        assert_eq!(config.wifi.password.expose(), "YourWiFiPassword");
        // stored beats builtin
        assert_eq!(config.wifi.ssid, "StoredNet");
        assert_eq!(config.feed.as_str(), "stored/feed");
        // env beats stored and builtin
        assert_eq!(config.mqtt.server.to_string(), "env.local:1885");
        assert!(config.mqtt.is_anonymous());

        let config = DeviceConfig::resolve(builtin, None, PartialConfig::default()).unwrap();
        assert_eq!(config.wifi.ssid, "YourWiFiNetwork");
        assert_eq!(config.mqtt.server.host, "broker.local");
    }

    #[test]
    fn test_resolve_reports_missing_keys() {
        let result = DeviceConfig::resolve(PartialConfig::default(), None, PartialConfig::default());
        assert_eq!(result, Err(ConfigError::Missing(KEY_WIFI_SSID)));
    }

    #[test]
    fn test_client_id_and_keep_alive_layers() {
        let mut layer = full_layer();
        layer.mqtt_client_id = Some("garage_01".into());
        layer.mqtt_keep_alive = Some(120);
        let config = layer.build().unwrap();
        assert_eq!(config.mqtt.client_id, "garage_01");
        assert_eq!(config.mqtt.keep_alive.as_secs(), 120);
    }

    #[test]
    fn test_json_roundtrip_through_device_config() {
        let config = full_layer()
            .merge(PartialConfig {
                mqtt_client_id: Some("node1".into()),
                ..Default::default()
            })
            .build()
            .unwrap();
        let json = PartialConfig::from(&config).to_json().unwrap();
        let restored = PartialConfig::from_json(&json).unwrap().build().unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_json_rejects_unknown_fields() {
        let result = PartialConfig::from_json(r#"{"wifi_ssid":"a","bogus":1}"#);
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_json_skips_unset_fields() {
        let layer = PartialConfig {
            feed: Some("a/b".into()),
            ..Default::default()
        };
        let json = layer.to_json().unwrap();
        assert!(json.contains("feed"));
        assert!(!json.contains("wifi_ssid"));
        assert!(PartialConfig::default().is_empty());
        assert!(!layer.is_empty());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let config = full_layer().build().unwrap();
        let line = config.redacted();
        assert!(line.contains("wifi_ssid=YourWiFiNetwork"));
        assert!(line.contains("feed=user/topic"));
        assert!(line.contains("mqtt_server=broker.local:1883"));
        assert!(!line.contains("YourWiFiPassword"));
        assert!(!line.contains("MQTTpassword"));
    }

    #[test]
    fn test_server_with_spaces_is_rejected() {
        let mut layer = full_layer();
        layer.mqtt_server = Some("YourMQTTserverAddress".into());
        // A single label of letters is a legal host name
        assert!(layer.build().is_ok());

        layer.mqtt_server = Some("Your MQTT server".into());
        assert!(matches!(layer.build(), Err(ConfigError::InvalidServer(_))));
    }
}
