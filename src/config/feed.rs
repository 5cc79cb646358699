//! The MQTT feed the node publishes to.
//!
//! A feed is a concrete topic name in `"<namespace>/<topic>"` form, e.g.
//! `"alice/temperature"` or `"alice/feeds/garage.door"`.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum topic length (MQTT UTF-8 string limit).
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Topic level separator.
pub const TOPIC_SEPARATOR: char = '/';

/// A validated publish topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedTopic(String);

impl FeedTopic {
    /// Validate and wrap a feed topic.
    pub fn new(topic: impl Into<String>) -> Result<Self, ConfigError> {
        let topic = topic.into();
        validate_publish_topic(&topic)?;
        if !topic.contains(TOPIC_SEPARATOR) {
            return Err(ConfigError::InvalidTopic(format!(
                "'{}' must be in <namespace>/<topic> form",
                topic
            )));
        }
        let first = topic.split(TOPIC_SEPARATOR).next().unwrap_or_default();
        let last = topic.rsplit(TOPIC_SEPARATOR).next().unwrap_or_default();
        if first.is_empty() {
            return Err(ConfigError::InvalidTopic("namespace is empty".into()));
        }
        if last.is_empty() {
            return Err(ConfigError::InvalidTopic("topic name is empty".into()));
        }
        Ok(Self(topic))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check the rules every topic we publish to must follow.
///
/// Wildcards are subscribe-only and `$`-prefixed topics are reserved for the
/// broker.
pub fn validate_publish_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::InvalidTopic("topic is empty".into()));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(ConfigError::InvalidTopic(format!(
            "{} bytes (max {})",
            topic.len(),
            MAX_TOPIC_LEN
        )));
    }
    if topic.contains('\0') {
        return Err(ConfigError::InvalidTopic("contains NUL".into()));
    }
    if topic.contains(['+', '#']) {
        return Err(ConfigError::InvalidTopic(format!(
            "'{}' contains a wildcard",
            topic
        )));
    }
    if topic.starts_with('$') {
        return Err(ConfigError::InvalidTopic(format!(
            "'{}' is a reserved broker topic",
            topic
        )));
    }
    Ok(())
}

/// Check a subscription filter: wildcards allowed, but `#` only as the
/// whole last level and `+` only as a whole level.
pub fn validate_topic_filter(filter: &str) -> Result<(), ConfigError> {
    if filter.is_empty() {
        return Err(ConfigError::InvalidTopic("filter is empty".into()));
    }
    if filter.len() > MAX_TOPIC_LEN || filter.contains('\0') {
        return Err(ConfigError::InvalidTopic("filter is not a valid UTF-8 string".into()));
    }
    let levels: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err(ConfigError::InvalidTopic(format!(
                "'{}': '#' must be the last level",
                filter
            )));
        }
        if level.contains('+') && *level != "+" {
            return Err(ConfigError::InvalidTopic(format!(
                "'{}': '+' must occupy a whole level",
                filter
            )));
        }
    }
    Ok(())
}

impl FromStr for FeedTopic {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for FeedTopic {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FeedTopic> for String {
    fn from(topic: FeedTopic) -> Self {
        topic.0
    }
}

impl fmt::Display for FeedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
