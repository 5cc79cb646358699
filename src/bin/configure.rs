//! Credential configuration utility.
//!
//! Validates WiFi and MQTT settings and stores them for the `node` binary.
//!
//! On host, values are read from the environment at run time and written to
//! `~/.feed-node/config.json` (or `$FEED_NODE_CONFIG`):
//!
//! ```text
//! WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret123" \
//! MQTT_SERVER="broker.local:1883" MQTT_USER="alice" MQTT_PASSWORD="pw" \
//! MQTT_FEED="alice/feeds/temp" cargo run --bin configure
//! ```
//!
//! On ESP32, the same variables are read at compile time and written to NVS:
//!
//! ```text
//! WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret123" MQTT_SERVER="broker.local" \
//! MQTT_FEED="alice/feeds/temp" cargo espflash flash --bin configure --features esp32
//! ```
//!
//! Only the keys that are set are stored. For open networks pass
//! `WIFI_PASSWORD=""`; for an anonymous broker leave `MQTT_USER` unset.
//! Pass `--clear` to remove the stored configuration.

use feed_node::config::{ConfigError, PartialConfig, REDACTED};

/// Print what will be stored without revealing secrets.
fn print_summary(layer: &PartialConfig) {
    let show = |value: Option<&str>| value.unwrap_or("(unset)").to_string();
    let mask = |secret: Option<&feed_node::Secret>| match secret {
        None => "(unset)".to_string(),
        Some(s) if s.is_empty() => "(none)".to_string(),
        Some(s) => format!("{} ({} chars)", REDACTED, s.len()),
    };

    println!("WiFi SSID:      {}", show(layer.wifi_ssid.as_deref()));
    println!("WiFi password:  {}", mask(layer.wifi_password.as_ref()));
    println!("MQTT server:    {}", show(layer.mqtt_server.as_deref()));
    if let Some(port) = layer.mqtt_port {
        println!("MQTT port:      {}", port);
    }
    println!("MQTT user:      {}", show(layer.mqtt_user.as_deref()));
    println!("MQTT password:  {}", mask(layer.mqtt_password.as_ref()));
    if let Some(id) = &layer.mqtt_client_id {
        println!("MQTT client id: {}", id);
    }
    if let Some(secs) = layer.mqtt_keep_alive {
        println!("Keep-alive:     {}s", secs);
    }
    println!("Feed:           {}", show(layer.feed.as_deref()));
}

/// Human-readable explanation for a validation failure.
fn describe(error: &ConfigError) -> String {
    match error {
        ConfigError::Missing(key) => format!(
            "{} is not set. Required: WIFI_SSID, MQTT_SERVER, MQTT_FEED",
            key
        ),
        ConfigError::PasswordTooShort { len, min } => format!(
            "WiFi password too short ({} bytes, min {} for WPA). Use WIFI_PASSWORD=\"\" for open networks",
            len, min
        ),
        other => other.to_string(),
    }
}

/// Check that `layer` describes a usable device.
///
/// The stored layer alone must be complete; nothing else is guaranteed to be
/// present when the node boots.
fn validate(layer: &PartialConfig) -> Result<(), String> {
    if layer.is_empty() {
        return Err("No settings given. Set WIFI_SSID, MQTT_SERVER and MQTT_FEED".to_string());
    }
    layer.build().map(|_| ()).map_err(|e| describe(&e))
}

#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\nError: {}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    // Brief pause to ensure serial output is flushed before process exits
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(not(feature = "esp32"))]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\nError: {}", msg);
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use feed_node::wifi::{init_nvs, save_device_config};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== Feed Node Configuration Utility ===\n");

    let layer = match PartialConfig::builtin() {
        Ok(layer) => layer,
        Err(e) => halt_with_error(&describe(&e)),
    };
    print_summary(&layer);

    if let Err(msg) = validate(&layer) {
        halt_with_error(&msg);
    }

    match init_nvs() {
        Ok(mut nvs) => {
            if let Err(e) = save_device_config(&mut nvs, &layer) {
                halt_with_error(&format!("saving to NVS failed: {:?}", e));
            }
        }
        Err(e) => halt_with_error(&format!("initializing NVS failed: {:?}", e)),
    }

    println!("\n=== Configuration saved to NVS ===");
    println!("\nCredentials persist across reboots.");
    println!("\n=== Done - you can disconnect the device ===\n");

    // Brief pause to ensure serial output is visible, then exit cleanly
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use feed_node::persistence_host::{clear_config_at, default_config_path, save_config_to};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("\n=== Feed Node Configuration Utility ===\n");

    let path = match default_config_path() {
        Ok(path) => path,
        Err(e) => halt_with_error(&format!("cannot locate config file: {}", e)),
    };

    if std::env::args().skip(1).any(|arg| arg == "--clear") {
        if let Err(e) = clear_config_at(&path) {
            halt_with_error(&format!("removing {:?} failed: {}", path, e));
        }
        println!("Stored configuration removed from {:?}", path);
        return;
    }

    let layer = match PartialConfig::from_env() {
        Ok(layer) => layer,
        Err(e) => halt_with_error(&describe(&e)),
    };
    print_summary(&layer);

    if let Err(msg) = validate(&layer) {
        halt_with_error(&msg);
    }

    if let Err(e) = save_config_to(&layer, &path) {
        halt_with_error(&format!("writing {:?} failed: {}", path, e));
    }

    println!("\n=== Configuration saved to {:?} ===\n", path);
}
