//! HTTP stats server for node monitoring.
//!
//! Provides a simple `/stats` endpoint that returns node statistics as JSON.
//! Uses `tiny_http` which works on both host and ESP32 (via std::net).
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "client_id": "feed-node-1a2b3c4d",
//!   "feed": "user/topic",
//!   "network": "connected:192.168.1.40",
//!   "mqtt": {
//!     "status": "connected",
//!     "published": 120,
//!     "received": 4,
//!     "reconnects": 2
//!   },
//!   "queue": {
//!     "queued_messages": 0,
//!     "expired_messages": 3,
//!     "dropped_full": 0
//!   }
//! }
//! ```

use log::{error, info, warn};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Instant;
use tiny_http::{Method, Response, Server};

/// Default port for the stats server.
pub const DEFAULT_STATS_PORT: u16 = 8080;

/// Broker session counters.
#[derive(Debug)]
pub struct MqttStats {
    /// Current session status string.
    status: RwLock<String>,
    /// Messages handed to the broker.
    pub published: AtomicUsize,
    /// Messages received on subscribed topics.
    pub received: AtomicUsize,
    /// Failed connection attempts followed by a retry.
    pub reconnects: AtomicUsize,
}

impl MqttStats {
    pub fn new() -> Self {
        Self {
            status: RwLock::new("disconnected".to_string()),
            published: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        }
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the reported status.
    pub fn set_status(&self, status: impl Into<String>) {
        if let Ok(mut guard) = self.status.write() {
            *guard = status.into();
        }
    }

    pub fn status(&self) -> String {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Serialize to JSON.
    fn to_json(&self) -> String {
        format!(
            r#"{{"status":{},"published":{},"received":{},"reconnects":{}}}"#,
            json_string(&self.status()),
            self.published.load(Ordering::Relaxed),
            self.received.load(Ordering::Relaxed),
            self.reconnects.load(Ordering::Relaxed)
        )
    }
}

impl Default for MqttStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Offline publish queue statistics.
///
/// High `expired_messages` means the broker stayed unreachable longer than
/// the queue TTL.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Publishes currently waiting for the broker.
    pub queued_messages: AtomicUsize,
    /// Cumulative count of publishes expired due to TTL.
    pub expired_messages: AtomicUsize,
    /// Cumulative count of publishes refused because the queue was full.
    pub dropped_full: AtomicUsize,
}

impl QueueStats {
    /// Create new queue stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to JSON.
    fn to_json(&self) -> String {
        format!(
            r#"{{"queued_messages":{},"expired_messages":{},"dropped_full":{}}}"#,
            self.queued_messages.load(Ordering::Relaxed),
            self.expired_messages.load(Ordering::Relaxed),
            self.dropped_full.load(Ordering::Relaxed)
        )
    }
}

/// Node statistics container.
///
/// Shared across the application and updated by the feed client.
/// All counters are atomics, so updates never block the MQTT event loop.
#[derive(Debug)]
pub struct NodeStats {
    /// When the node started.
    start_time: Instant,
    /// MQTT client identifier.
    pub client_id: String,
    /// Feed the node publishes to.
    pub feed: String,
    /// Link status string.
    network: RwLock<String>,
    pub mqtt: MqttStats,
    pub queue: QueueStats,
}

impl NodeStats {
    /// Create new node statistics.
    pub fn new(client_id: impl Into<String>, feed: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            client_id: client_id.into(),
            feed: feed.into(),
            network: RwLock::new("disconnected".to_string()),
            mqtt: MqttStats::new(),
            queue: QueueStats::new(),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn set_network_status(&self, status: impl Into<String>) {
        if let Ok(mut guard) = self.network.write() {
            *guard = status.into();
        }
    }

    pub fn network_status(&self) -> String {
        self.network
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Serialize all statistics to JSON.
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"uptime_secs":{},"client_id":{},"feed":{},"network":{},"mqtt":{},"queue":{}}}"#,
            self.uptime_secs(),
            json_string(&self.client_id),
            json_string(&self.feed),
            json_string(&self.network_status()),
            self.mqtt.to_json(),
            self.queue.to_json()
        )
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new("unknown", "unknown")
    }
}

/// Quote and escape a string for embedding in JSON.
fn json_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// HTTP stats server.
///
/// Runs in a background thread and serves node statistics as JSON.
pub struct StatsServer {
    /// Server thread handle.
    handle: Option<thread::JoinHandle<()>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl StatsServer {
    /// Start the stats server.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - IP address to bind to (use `None` for 0.0.0.0)
    /// * `port` - Port to listen on
    /// * `stats` - Shared statistics to serve
    ///
    /// # Returns
    ///
    /// A handle to the running server. Drop it to stop the server.
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        stats: Arc<NodeStats>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(IpAddr::V6(ip)) => format!("[{}]:{}", ip, port),
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;

        info!("Stats server listening on http://{}/stats", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, stats, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    fn run_server(server: Server, stats: Arc<NodeStats>, shutdown: Arc<AtomicBool>) {
        let headers = match (
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]),
            tiny_http::Header::from_bytes(&b"Location"[..], &b"/stats"[..]),
            tiny_http::Header::from_bytes(&b"Allow"[..], &b"GET"[..]),
        ) {
            (Ok(content_type), Ok(location), Ok(allow_get)) => (content_type, location, allow_get),
            _ => {
                error!("Failed to build stats server headers");
                return;
            }
        };
        let (content_type, location, allow_get) = headers;

        loop {
            // Acquire pairs with the Release store in stop()
            if shutdown.load(Ordering::Acquire) {
                info!("Stats server shutting down");
                break;
            }

            match server.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(Some(request)) => {
                    if request.method() != &Method::Get {
                        let response = Response::from_string("Method Not Allowed")
                            .with_status_code(405)
                            .with_header(allow_get.clone());
                        let _ = request.respond(response);
                        continue;
                    }

                    let path = request.url();

                    if path == "/stats" || path == "/stats/" {
                        let response = Response::from_string(stats.to_json())
                            .with_header(content_type.clone())
                            .with_status_code(200);

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send response: {}", e);
                        }
                    } else if path == "/" {
                        let response = Response::from_string("See /stats for node statistics")
                            .with_status_code(302)
                            .with_header(location.clone());

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send redirect: {}", e);
                        }
                    } else {
                        let response = Response::from_string("Not Found").with_status_code(404);

                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send 404: {}", e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop the server.
    ///
    /// Note: May take up to 100ms due to polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsServer {
    fn drop(&mut self) {
        self.stop();
    }
}
