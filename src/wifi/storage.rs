//! NVS persistence for the device configuration.
//!
//! The stored layer is the JSON form of [`PartialConfig`], so the
//! `configure` tool may write only the keys it was given.

use crate::config::PartialConfig;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, error, info, warn};

/// NVS namespace for device configuration.
const NVS_NAMESPACE: &str = "feed_node";

/// NVS key for the stored configuration blob.
const NVS_KEY: &str = "config";

/// Upper bound for the stored JSON; generous for six short strings.
const MAX_CONFIG_BUFFER_SIZE: usize = 1024;

/// Load the stored configuration layer.
///
/// Returns `None` if nothing is stored or the blob is corrupted.
pub fn load_device_config(nvs: &EspNvs<NvsDefault>) -> Option<PartialConfig> {
    let mut buf = [0u8; MAX_CONFIG_BUFFER_SIZE];
    let bytes = match nvs.get_raw(NVS_KEY, &mut buf) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!("No device configuration in NVS");
            return None;
        }
        Err(e) => {
            warn!("Failed to read device configuration from NVS: {:?}", e);
            return None;
        }
    };

    let json = match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            error!("Stored configuration is not valid UTF-8: {:?}", e);
            return None;
        }
    };

    match PartialConfig::from_json(json) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to parse stored configuration: {}", e);
            None
        }
    }
}

/// Save the configuration layer to NVS.
pub fn save_device_config(
    nvs: &mut EspNvs<NvsDefault>,
    config: &PartialConfig,
) -> Result<(), EspError> {
    let json = config
        .to_json()
        .map_err(|_| EspError::from_infallible::<{ esp_idf_sys::ESP_ERR_INVALID_ARG }>())?;
    if json.len() > MAX_CONFIG_BUFFER_SIZE {
        return Err(EspError::from_infallible::<{ esp_idf_sys::ESP_ERR_INVALID_SIZE }>());
    }
    nvs.set_raw(NVS_KEY, json.as_bytes())?;
    info!("Device configuration saved to NVS ({} bytes)", json.len());
    Ok(())
}

/// Clear the stored configuration.
pub fn clear_device_config(nvs: &mut EspNvs<NvsDefault>) -> Result<(), EspError> {
    nvs.remove(NVS_KEY)?;
    Ok(())
}

/// Open the NVS namespace used for device configuration.
pub fn init_nvs() -> Result<EspNvs<NvsDefault>, EspError> {
    let partition = EspNvsPartition::<NvsDefault>::take()?;
    EspNvs::new(partition, NVS_NAMESPACE, true)
}
