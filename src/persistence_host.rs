//! Configuration persistence for host (development) builds.
//!
//! Stores the device's [`PartialConfig`] layer in a JSON file so credentials
//! survive across runs. Uses `~/.feed-node/config.json` by default; set
//! `FEED_NODE_CONFIG` to point somewhere else.
//!
//! # Usage
//!
//! ```ignore
//! use feed_node::{persistence_host, DeviceConfig};
//!
//! let stored = persistence_host::load_config();
//! let config = DeviceConfig::load(stored)?;
//! log::info!("Config: {}", config.redacted());
//! ```

use crate::config::PartialConfig;
use log::{debug, error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "FEED_NODE_CONFIG";

/// Get the default config file path.
///
/// Returns `$FEED_NODE_CONFIG` if set, else `~/.feed-node/config.json`.
pub fn default_config_path() -> io::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".feed-node").join("config.json"))
}

/// Load the stored configuration layer from a specific path.
///
/// Returns `None` if no file exists or if the data is corrupted.
pub fn load_config_from(path: &Path) -> Option<PartialConfig> {
    let json = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No config file found at {:?}", path);
            return None;
        }
        Err(e) => {
            warn!("Failed to read config file {:?}: {}", path, e);
            return None;
        }
    };

    match PartialConfig::from_json(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to parse stored config {:?}: {}", path, e);
            None
        }
    }
}

/// Load the stored configuration layer from the default path.
pub fn load_config() -> Option<PartialConfig> {
    let path = default_config_path().ok()?;
    load_config_from(&path)
}

/// Save the configuration layer to a specific path.
pub fn save_config_to(config: &PartialConfig, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = config
        .to_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    fs::write(path, &json)?;
    restrict_permissions(path)?;

    // Verify write by reading back
    let read_back = fs::read_to_string(path)?;
    if read_back != json {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Config verification failed: wrote {} bytes, read {} bytes",
                json.len(),
                read_back.len()
            ),
        ));
    }

    info!("Config saved to {:?}", path);
    Ok(())
}

/// Save the configuration layer to the default path.
pub fn save_config(config: &PartialConfig) -> io::Result<PathBuf> {
    let path = default_config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Remove the config file at `path`. A missing file is not an error.
pub fn clear_config_at(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Config cleared at {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove the config file at the default path.
pub fn clear_config() -> io::Result<()> {
    let path = default_config_path()?;
    clear_config_at(&path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
