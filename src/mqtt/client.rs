//! Feed client built on `rumqttc`.
//!
//! [`FeedClient::new`] returns two halves:
//!
//! - [`FeedClient`] - cloneable handle used to publish and subscribe
//! - [`FeedEventLoop`] - drives the broker session; run it on its own task
//!
//! # Lock Ordering
//!
//! `queue` is always taken before `status`. The event loop flips the
//! connected flag while holding `queue`, so a publish that observes
//! "disconnected" is guaranteed to land in the queue before it is flushed.
//!
//! # Example
//!
//! ```no_run
//! use feed_node::config::PartialConfig;
//! use feed_node::mqtt::{FeedClient, FeedOptions};
//! use feed_node::network::NodeStats;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(layers: PartialConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let config = layers.build()?;
//! let stats = Arc::new(NodeStats::new(config.mqtt.client_id.clone(), config.feed.to_string()));
//! let (client, event_loop) =
//!     FeedClient::new(&config.mqtt, config.feed.clone(), FeedOptions::default(), stats);
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(event_loop.run(cancel.clone(), |msg| log::info!("{}", msg.topic)));
//! client.publish("21.5").await?;
//! # Ok(())
//! # }
//! ```

use super::{Backoff, MqttError, MqttStatus, PublishQueue, QoS, QueuedPublish};
use super::{DEFAULT_QUEUE_CAPACITY, QUEUE_MESSAGE_TTL};
use crate::config::{validate_publish_topic, validate_topic_filter, FeedTopic, MqttConfig};
use crate::network::NodeStats;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Capacity of the request channel between client handles and the event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Tunables for the feed client.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// QoS for feed publishes.
    pub qos: QoS,
    /// Ask the broker to retain the last feed value.
    pub retain: bool,
    /// Maximum publishes held while the broker is unreachable.
    pub queue_capacity: usize,
    /// How long a queued publish stays deliverable.
    pub queue_ttl: Duration,
    /// Reconnect delay policy.
    pub backoff: Backoff,
    /// Start a fresh session on every connect.
    pub clean_session: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_ttl: QUEUE_MESSAGE_TTL,
            backoff: Backoff::default(),
            clean_session: true,
        }
    }
}

/// What happened to a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the live session.
    Sent,
    /// Broker unreachable; held with `pending` publishes now waiting.
    Queued { pending: usize },
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl IncomingMessage {
    /// Payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// State shared between client handles and the event loop.
struct Shared {
    connected: AtomicBool,
    queue: Mutex<PublishQueue>,
    status: Mutex<MqttStatus>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    stats: Arc<NodeStats>,
}

impl Shared {
    async fn set_status(&self, status: MqttStatus) {
        self.stats.mqtt.set_status(status.as_status_string());
        *self.status.lock().await = status;
    }
}

/// Handle for publishing to the feed and managing subscriptions.
#[derive(Clone)]
pub struct FeedClient {
    client: AsyncClient,
    feed: FeedTopic,
    qos: QoS,
    retain: bool,
    shared: Arc<Shared>,
}

impl FeedClient {
    /// Create a client for `config`'s broker publishing to `feed`.
    ///
    /// Nothing touches the network until [`FeedEventLoop::run`] is polled.
    pub fn new(
        config: &MqttConfig,
        feed: FeedTopic,
        options: FeedOptions,
        stats: Arc<NodeStats>,
    ) -> (FeedClient, FeedEventLoop) {
        let mut mqtt_options =
            MqttOptions::new(&config.client_id, &config.server.host, config.server.port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_clean_session(options.clean_session);
        if !config.is_anonymous() {
            mqtt_options.set_credentials(&config.user, config.password.expose());
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            queue: Mutex::new(PublishQueue::new(options.queue_capacity, options.queue_ttl)),
            status: Mutex::new(MqttStatus::Disconnected),
            subscriptions: Mutex::new(Vec::new()),
            stats,
        });

        let feed_client = FeedClient {
            client: client.clone(),
            feed,
            qos: options.qos,
            retain: options.retain,
            shared: shared.clone(),
        };

        let event_loop = FeedEventLoop {
            event_loop,
            client,
            shared,
            backoff: options.backoff,
            qos: options.qos,
            retain: options.retain,
            server: config.server.to_string(),
        };

        (feed_client, event_loop)
    }

    /// The feed this client publishes to.
    pub fn feed(&self) -> &FeedTopic {
        &self.feed
    }

    /// Publish `payload` to the feed.
    pub async fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<PublishOutcome, MqttError> {
        let topic = self.feed.as_str().to_string();
        self.publish_inner(topic, payload.into()).await
    }

    /// Publish `payload` to an arbitrary concrete topic.
    pub async fn publish_to(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<PublishOutcome, MqttError> {
        validate_publish_topic(topic)?;
        self.publish_inner(topic.to_string(), payload.into()).await
    }

    async fn publish_inner(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> Result<PublishOutcome, MqttError> {
        let mut queue = self.shared.queue.lock().await;

        if !self.shared.connected.load(Ordering::Acquire) {
            let stats = &self.shared.stats.queue;
            return match queue.push(QueuedPublish::new(topic, payload)) {
                Ok(pending) => {
                    stats.queued_messages.store(pending, Ordering::Relaxed);
                    debug!("Broker unreachable, publish queued ({} pending)", pending);
                    Ok(PublishOutcome::Queued { pending })
                }
                Err(rejected) => {
                    warn!("Offline queue full, dropping publish to {}", rejected.topic());
                    stats.dropped_full.fetch_add(1, Ordering::Relaxed);
                    Err(MqttError::QueueFull {
                        capacity: queue.capacity(),
                    })
                }
            };
        }
        drop(queue);

        self.client
            .publish(topic.as_str(), self.qos.into(), self.retain, payload)
            .await?;
        self.shared.stats.mqtt.record_published();
        debug!("Published to {}", topic);
        Ok(PublishOutcome::Sent)
    }

    /// Subscribe to a topic filter. The subscription is renewed after every
    /// reconnect.
    pub async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), MqttError> {
        validate_topic_filter(filter)?;
        {
            let mut subs = self.shared.subscriptions.lock().await;
            match subs.iter_mut().find(|(f, _)| f == filter) {
                Some(existing) => existing.1 = qos,
                None => subs.push((filter.to_string(), qos)),
            }
        }
        if self.shared.connected.load(Ordering::Acquire) {
            self.client.subscribe(filter, qos.into()).await?;
        }
        info!("Subscribed to {} (QoS {})", filter, qos);
        Ok(())
    }

    /// Drop a subscription.
    pub async fn unsubscribe(&self, filter: &str) -> Result<(), MqttError> {
        self.shared
            .subscriptions
            .lock()
            .await
            .retain(|(f, _)| f != filter);
        if self.shared.connected.load(Ordering::Acquire) {
            self.client.unsubscribe(filter).await?;
        }
        Ok(())
    }

    /// Topic filters currently subscribed.
    pub async fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.shared.subscriptions.lock().await.clone()
    }

    /// Current session state.
    pub async fn status(&self) -> MqttStatus {
        self.shared.status.lock().await.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Publishes waiting for the broker.
    pub async fn pending(&self) -> usize {
        self.shared.queue.lock().await.len()
    }

    /// Send DISCONNECT. The event loop stops on its own once the request is
    /// processed.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Drives the broker session: connects, reconnects with backoff, renews
/// subscriptions, flushes queued publishes, and delivers incoming messages.
pub struct FeedEventLoop {
    event_loop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    backoff: Backoff,
    qos: QoS,
    retain: bool,
    server: String,
}

impl FeedEventLoop {
    /// Run until `cancel` fires or the client disconnects.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_message: F)
    where
        F: FnMut(IncomingMessage),
    {
        info!("Connecting to MQTT broker {}", self.server);
        self.shared.set_status(MqttStatus::Connecting).await;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("MQTT event loop shutting down");
                    break;
                }
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.on_connected().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("Received message on topic: {}", publish.topic);
                    self.shared.stats.mqtt.record_received();
                    on_message(IncomingMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        retain: publish.retain,
                    });
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    debug!("Subscription acknowledged: {:?}", suback);
                }
                Ok(Event::Incoming(Packet::PubAck(puback))) => {
                    debug!("Publish acknowledged: {}", puback.pkid);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker closed the session");
                    self.on_disconnected().await;
                }
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                    info!("Disconnected from broker");
                    self.on_disconnected().await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let err = MqttError::from(e);
                    self.on_disconnected().await;
                    self.shared.stats.mqtt.record_reconnect();

                    let delay = self.backoff.next_delay();
                    let attempt = self.backoff.attempts();
                    if err.is_authentication() {
                        error!("MQTT {} (check MQTT_USER / MQTT_PASSWORD)", err);
                    } else {
                        warn!("MQTT {}, retrying in {:?}", err, delay);
                    }
                    self.shared
                        .set_status(MqttStatus::Backoff {
                            attempt,
                            delay,
                            reason: err.to_string(),
                        })
                        .await;

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("MQTT event loop shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.shared.set_status(MqttStatus::Connecting).await;
                }
            }
        }

        self.shared.connected.store(false, Ordering::Release);
        self.shared.set_status(MqttStatus::Disconnected).await;
    }

    async fn on_connected(&mut self) {
        info!("Connected to MQTT broker {}", self.server);
        self.backoff.reset();

        // Flip the flag under the queue lock; see module docs
        let (ready, expired) = {
            let mut queue = self.shared.queue.lock().await;
            self.shared.connected.store(true, Ordering::Release);
            queue.drain_ready()
        };
        self.shared.set_status(MqttStatus::Connected).await;

        let queue_stats = &self.shared.stats.queue;
        queue_stats.queued_messages.store(0, Ordering::Relaxed);
        if expired > 0 {
            queue_stats
                .expired_messages
                .fetch_add(expired, Ordering::Relaxed);
            warn!("Dropped {} expired queued publishes", expired);
        }

        let subs = self.shared.subscriptions.lock().await.clone();

        // Requests go through the bounded channel this loop drains, so they
        // are sent from a separate task.
        let client = self.client.clone();
        let stats = self.shared.stats.clone();
        let (qos, retain) = (self.qos, self.retain);
        tokio::spawn(async move {
            for (filter, sub_qos) in subs {
                if let Err(e) = client.subscribe(filter.as_str(), sub_qos.into()).await {
                    error!("Resubscribe to {} failed: {}", filter, e);
                }
            }
            if !ready.is_empty() {
                info!("Flushing {} queued publishes", ready.len());
            }
            for item in ready {
                debug!(
                    "Flushing queued publish to {} ({} bytes)",
                    item.topic(),
                    item.payload().len()
                );
                let (topic, payload) = item.into_parts();
                match client.publish(topic.as_str(), qos.into(), retain, payload).await {
                    Ok(()) => stats.mqtt.record_published(),
                    Err(e) => error!("Queued publish to {} failed: {}", topic, e),
                }
            }
        });
    }

    async fn on_disconnected(&mut self) {
        // Same ordering as on_connected
        let _queue = self.shared.queue.lock().await;
        self.shared.connected.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerAddr, MqttConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn config_for(port: u16) -> MqttConfig {
        MqttConfig::new(BrokerAddr::new("127.0.0.1", port).unwrap(), "user", "secret")
            .unwrap()
            .with_client_id("test_client")
            .unwrap()
    }

    fn feed() -> FeedTopic {
        FeedTopic::new("user/topic").unwrap()
    }

    fn stats() -> Arc<NodeStats> {
        Arc::new(NodeStats::new("test_client", "user/topic"))
    }

    /// Port with nothing listening on it.
    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_queued() {
        let stats = stats();
        let (client, _event_loop) =
            FeedClient::new(&config_for(1883), feed(), FeedOptions::default(), stats.clone());

        assert_eq!(
            client.publish("21.5").await.unwrap(),
            PublishOutcome::Queued { pending: 1 }
        );
        assert_eq!(
            client.publish_to("user/other", "x").await.unwrap(),
            PublishOutcome::Queued { pending: 2 }
        );
        assert_eq!(client.pending().await, 2);
        assert_eq!(stats.queue.queued_messages.load(Ordering::Relaxed), 2);
        assert!(!client.is_connected());
        assert_eq!(client.status().await, MqttStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let stats = stats();
        let options = FeedOptions {
            queue_capacity: 1,
            ..Default::default()
        };
        let (client, _event_loop) = FeedClient::new(&config_for(1883), feed(), options, stats.clone());

        client.publish("a").await.unwrap();
        let err = client.publish("b").await.unwrap_err();
        assert!(matches!(err, MqttError::QueueFull { capacity: 1 }));
        assert_eq!(stats.queue.dropped_full.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_publish_to_rejects_bad_topics() {
        let (client, _event_loop) =
            FeedClient::new(&config_for(1883), feed(), FeedOptions::default(), stats());
        assert!(matches!(
            client.publish_to("user/#", "x").await,
            Err(MqttError::InvalidTopic(_))
        ));
        assert!(matches!(
            client.publish_to("", "x").await,
            Err(MqttError::InvalidTopic(_))
        ));
        assert_eq!(client.pending().await, 0);
    }

    #[tokio::test]
    async fn test_subscriptions_are_remembered() {
        let (client, _event_loop) =
            FeedClient::new(&config_for(1883), feed(), FeedOptions::default(), stats());

        client.subscribe("user/commands", QoS::AtLeastOnce).await.unwrap();
        client.subscribe("user/+/set", QoS::AtMostOnce).await.unwrap();
        client.subscribe("user/commands", QoS::ExactlyOnce).await.unwrap();
        assert!(client.subscribe("user/#/bad", QoS::AtMostOnce).await.is_err());

        let subs = client.subscriptions().await;
        assert_eq!(
            subs,
            vec![
                ("user/commands".to_string(), QoS::ExactlyOnce),
                ("user/+/set".to_string(), QoS::AtMostOnce),
            ]
        );

        client.unsubscribe("user/+/set").await.unwrap();
        assert_eq!(client.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_broker_backs_off() {
        let stats = stats();
        let (client, event_loop) = FeedClient::new(
            &config_for(closed_port()),
            feed(),
            FeedOptions::default(),
            stats.clone(),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(event_loop.run(cancel.clone(), |_| {}));

        let mut backed_off = false;
        for _ in 0..50 {
            if matches!(client.status().await, MqttStatus::Backoff { .. }) {
                backed_off = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(backed_off);
        assert!(stats.mqtt.reconnects.load(Ordering::Relaxed) >= 1);
        assert!(stats.mqtt.status().starts_with("backoff:1:"));

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(client.status().await, MqttStatus::Disconnected);
    }

    /// Accept one client, check that it opens with CONNECT and answer with a
    /// CONNACK carrying `return_code` (0 accepts, 4 is bad user name or
    /// password).
    async fn accept_session(listener: &TcpListener, return_code: u8) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 512];
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert_eq!(buf[0] >> 4, 1, "first packet must be CONNECT");
        socket
            .write_all(&[0x20, 0x02, 0x00, return_code])
            .await
            .unwrap();
        socket
    }

    /// Read from `socket` until `expect` shows up or the client hangs up.
    async fn read_until(socket: &mut TcpStream, expect: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let mut received = Vec::new();
        while !received.windows(expect.len()).any(|w| w == expect) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        received
    }

    /// Minimal broker: accepts one session and returns everything the client
    /// sends up to `expect`, along with the still-open socket.
    async fn fake_broker(listener: TcpListener, expect: &'static [u8]) -> (Vec<u8>, TcpStream) {
        let mut socket = accept_session(&listener, 0).await;
        let received = read_until(&mut socket, expect).await;
        (received, socket)
    }

    #[tokio::test]
    async fn test_queued_publish_is_flushed_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(fake_broker(listener, b"hello feed"));

        let stats = stats();
        let options = FeedOptions {
            qos: QoS::AtMostOnce,
            ..Default::default()
        };
        let (client, event_loop) = FeedClient::new(&config_for(port), feed(), options, stats.clone());

        assert!(matches!(
            client.publish("hello feed").await.unwrap(),
            PublishOutcome::Queued { .. }
        ));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(event_loop.run(cancel.clone(), |_| {}));

        let (received, _socket) = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        assert!(received.windows(b"user/topic".len()).any(|w| w == b"user/topic"));
        assert!(client.is_connected());
        assert_eq!(client.status().await, MqttStatus::Connected);
        assert_eq!(client.pending().await, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_incoming_publish_reaches_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let mut socket = accept_session(&listener, 0).await;
            // PUBLISH, QoS 0: topic "user/command", payload "on"
            let mut packet = vec![0x30, 16, 0x00, 12];
            packet.extend_from_slice(b"user/command");
            packet.extend_from_slice(b"on");
            socket.write_all(&packet).await.unwrap();
            socket
        });

        let stats = stats();
        let (_client, event_loop) =
            FeedClient::new(&config_for(port), feed(), FeedOptions::default(), stats.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(event_loop.run(cancel.clone(), move |message| {
            let _ = tx.send(message);
        }));

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.topic, "user/command");
        assert_eq!(message.payload_str(), Some("on"));
        assert!(!message.retain);
        assert_eq!(stats.mqtt.received.load(Ordering::Relaxed), 1);

        let _socket = broker.await.unwrap();
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_backs_off_on_auth_failure_and_resubscribes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            // Session 1: accept, acknowledge the subscription, then drop
            let mut first = accept_session(&listener, 0).await;
            let subscribe = read_until(&mut first, b"user/command").await;
            assert_eq!(subscribe[0] >> 4, 8, "expected SUBSCRIBE");
            first
                .write_all(&[0x90, 0x03, subscribe[2], subscribe[3], 0x01])
                .await
                .unwrap();
            drop(first);

            // Session 2: refuse the credentials
            let mut second = accept_session(&listener, 4).await;
            let mut buf = [0u8; 64];
            let _ = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf)).await;
            drop(second);

            // Session 3: accept and wait for the subscription to be renewed
            let mut third = accept_session(&listener, 0).await;
            let renewed = read_until(&mut third, b"user/command").await;
            (renewed, third)
        });

        let stats = stats();
        let options = FeedOptions {
            backoff: Backoff::new(Duration::from_millis(200), Duration::from_millis(400)),
            ..Default::default()
        };
        let (client, event_loop) = FeedClient::new(&config_for(port), feed(), options, stats.clone());
        client.subscribe("user/command", QoS::AtLeastOnce).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(event_loop.run(cancel.clone(), |_| {}));

        let watcher_client = client.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if let MqttStatus::Backoff { reason, .. } = watcher_client.status().await {
                    if reason.contains("authentication failed") {
                        return true;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let (renewed, _socket) = tokio::time::timeout(Duration::from_secs(10), broker)
            .await
            .unwrap()
            .unwrap();
        assert!(renewed.windows(b"user/command".len()).any(|w| w == b"user/command"));

        let saw_auth_backoff = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(saw_auth_backoff);
        assert!(stats.mqtt.reconnects.load(Ordering::Relaxed) >= 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
