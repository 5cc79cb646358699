//! Feed node binary with a serial console.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `MQTT_SERVER=broker.local MQTT_FEED=alice/feeds/temp WIFI_SSID=lab cargo run --bin node`
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//!
//! Settings resolve builtin (compile-time env) < stored (config file or NVS)
//! < runtime environment. See `configure` for storing them.
//!
//! ## Console Commands
//!
//! Connect via serial monitor (or use the terminal on host) and type:
//! - `pub <text>` - Publish to the feed
//! - `pubto <topic> <text>` - Publish to any topic
//! - `sub <filter>` / `unsub <filter>` - Manage subscriptions
//! - `status` - Show node status
//! - `help` - Show help
//!
//! ## Endpoints
//!
//! - Stats: http://localhost:8080/stats

use feed_node::console::{self, ConsoleCommand, HELP_TEXT};
use feed_node::mqtt::{FeedClient, FeedOptions, MqttError, PublishOutcome, QoS};
use feed_node::network::{NetworkProvider, NodeStats, StatsServer, DEFAULT_STATS_PORT};
use feed_node::DeviceConfig;
use log::{debug, error, info, warn};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How often to publish a heartbeat to the feed.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Console lines buffered between the stdin thread and the command loop.
const CONSOLE_CHANNEL_CAPACITY: usize = 16;

type BoxError = Box<dyn std::error::Error>;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Print a message to stdout (for console output).
fn print_console(msg: &str) {
    println!("{}", msg);
    let _ = std::io::stdout().flush();
}

/// Print the prompt.
fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[cfg(feature = "esp32")]
fn load_config() -> Result<DeviceConfig, BoxError> {
    let nvs = feed_node::wifi::init_nvs()?;
    let stored = feed_node::wifi::load_device_config(&nvs);
    Ok(DeviceConfig::load(stored)?)
}

#[cfg(not(feature = "esp32"))]
fn load_config() -> Result<DeviceConfig, BoxError> {
    let stored = feed_node::persistence_host::load_config();
    Ok(DeviceConfig::load(stored)?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    if let Err(e) = run().await {
        error!("Fatal: {}", e);
        // Brief pause so the message reaches the serial monitor
        #[cfg(feature = "esp32")]
        std::thread::sleep(Duration::from_secs(2));
        std::process::exit(1);
    }

    info!("Shutdown complete");
}

async fn run() -> Result<(), BoxError> {
    info!("=== Feed node starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let config = load_config()?;
    info!("Config: {}", config.redacted());

    let stats = Arc::new(NodeStats::new(
        config.mqtt.client_id.clone(),
        config.feed.to_string(),
    ));

    // Bring the link up
    #[cfg(feature = "esp32")]
    let mut network = {
        let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
        let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()?;
        feed_node::network::WifiNetwork::new(peripherals.modem, sysloop, config.wifi.clone())?
    };

    #[cfg(not(feature = "esp32"))]
    let mut network = {
        info!("WiFi is managed by the OS on host (configured SSID: {})", config.wifi.ssid);
        feed_node::network::HostNetwork::for_broker(&config.mqtt.server)
    };

    let link = network.connect()?;
    stats.set_network_status(link.as_status_string());
    match network.ip_addr() {
        Some(ip) => info!("Network up ({}), IP: {}", link, ip),
        None => warn!("Network {}, local IP unknown", link),
    }

    let _stats_server = match StatsServer::start(None, DEFAULT_STATS_PORT, stats.clone()) {
        Ok(server) => {
            info!(
                "Stats server at http://localhost:{}/stats",
                DEFAULT_STATS_PORT
            );
            Some(server)
        }
        Err(e) => {
            warn!("Failed to start stats server: {}", e);
            None
        }
    };

    let cancel = CancellationToken::new();

    let (client, event_loop) = FeedClient::new(
        &config.mqtt,
        config.feed.clone(),
        FeedOptions::default(),
        stats.clone(),
    );

    let mut mqtt_task = tokio::spawn(event_loop.run(cancel.clone(), |message| {
        print_console(&console::format_incoming_message(&message));
    }));

    // Blocking stdin reads live on a detached thread; runtime shutdown must
    // not wait on them
    let (line_tx, mut line_rx) = mpsc::channel::<String>(CONSOLE_CHANNEL_CAPACITY);
    let stdin_cancel = cancel.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if stdin_cancel.is_cancelled() {
                break;
            }
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });

    print_console("");
    print_console(&format!("Publishing to {}. Type 'help' for commands.", config.feed));
    print_prompt();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut console_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                print_console("\nShutting down...");
                break;
            }
            result = &mut mqtt_task => {
                if let Err(e) = result {
                    error!("MQTT task error: {}", e);
                }
                cancel.cancel();
                return Ok(());
            }
            _ = heartbeat.tick() => {
                publish_heartbeat(&client, &stats).await;
            }
            line = line_rx.recv(), if console_open => {
                match line {
                    Some(line) => {
                        handle_command(ConsoleCommand::parse(&line), &client, &stats).await;
                        print_prompt();
                    }
                    None => {
                        info!("Console detached, node keeps running");
                        console_open = false;
                    }
                }
            }
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("Disconnect request failed: {}", e);
    }
    // Give the event loop a moment to send DISCONNECT before cancelling
    if tokio::time::timeout(Duration::from_secs(2), &mut mqtt_task)
        .await
        .is_err()
    {
        debug!("MQTT event loop did not stop in time");
    }
    cancel.cancel();

    if let Err(e) = network.disconnect() {
        warn!("Network disconnect failed: {}", e);
    }
    stats.set_network_status(network.status().as_status_string());

    Ok(())
}

/// Resolves on Ctrl+C. The device has no signal source and runs until reset.
#[cfg(not(feature = "esp32"))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(feature = "esp32")]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}

/// Publish a heartbeat to the feed. Skipped while the broker is offline.
async fn publish_heartbeat(client: &FeedClient, stats: &NodeStats) {
    if !client.is_connected() {
        debug!("Broker offline, heartbeat skipped");
        return;
    }

    let payload = serde_json::json!({
        "uptime_secs": stats.uptime_secs(),
        "status": stats.mqtt.status(),
    })
    .to_string();

    match client.publish(payload).await {
        Ok(PublishOutcome::Sent) => debug!("Heartbeat published"),
        Ok(PublishOutcome::Queued { pending }) => {
            debug!("Heartbeat queued ({} pending)", pending)
        }
        Err(e) => warn!("Heartbeat dropped: {}", e),
    }
}

/// Handle a parsed console command.
async fn handle_command(cmd: ConsoleCommand, client: &FeedClient, stats: &NodeStats) {
    match cmd {
        ConsoleCommand::Publish { text } => {
            let result = client.publish(text).await;
            report_publish(client.feed().as_str(), result);
        }
        ConsoleCommand::PublishTo { topic, text } => {
            let result = client.publish_to(&topic, text).await;
            report_publish(&topic, result);
        }
        ConsoleCommand::Subscribe { filter } => {
            match client.subscribe(&filter, QoS::AtLeastOnce).await {
                Ok(()) => print_console(&format!("Subscribed to {}", filter)),
                Err(e) => print_console(&format!("Subscribe failed: {}", e)),
            }
        }
        ConsoleCommand::Unsubscribe { filter } => match client.unsubscribe(&filter).await {
            Ok(()) => print_console(&format!("Unsubscribed from {}", filter)),
            Err(e) => print_console(&format!("Unsubscribe failed: {}", e)),
        },
        ConsoleCommand::Status => {
            let subscriptions = client
                .subscriptions()
                .await
                .into_iter()
                .map(|(filter, _)| filter)
                .collect::<Vec<_>>();
            print_console(&format!(
                "Node Status:\n  Client id: {}\n  Feed: {}\n  Network: {}\n  MQTT: {}\n  Uptime: {}s\n  Pending publishes: {}\n  Subscriptions: {}",
                stats.client_id,
                client.feed(),
                stats.network_status(),
                client.status().await,
                stats.uptime_secs(),
                client.pending().await,
                if subscriptions.is_empty() {
                    "(none)".to_string()
                } else {
                    subscriptions.join(", ")
                },
            ));
        }
        ConsoleCommand::Help => print_console(HELP_TEXT),
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(hint) => print_console(&hint),
    }
}

fn report_publish(topic: &str, result: Result<PublishOutcome, MqttError>) {
    match result {
        Ok(PublishOutcome::Sent) => print_console(&format!("Published to {}", topic)),
        Ok(PublishOutcome::Queued { pending }) => print_console(&format!(
            "Broker unreachable, queued for {} ({} pending)",
            topic, pending
        )),
        Err(e) => print_console(&format!("Publish failed: {}", e)),
    }
}
