//! Offline publish queue.
//!
//! Payloads published while the broker is unreachable are held here and
//! sent, oldest first, as soon as the session is re-established.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Time-to-live for queued publishes. Older entries are dropped instead of
/// being delivered late.
pub const QUEUE_MESSAGE_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of queued publishes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// A publish waiting for the broker connection.
#[derive(Clone, Debug)]
pub struct QueuedPublish {
    topic: String,
    payload: Vec<u8>,
    queued_at: Instant,
}

impl QueuedPublish {
    /// Create a new queued publish with the current timestamp.
    pub fn new(topic: String, payload: Vec<u8>) -> Self {
        Self {
            topic,
            payload,
            queued_at: Instant::now(),
        }
    }

    /// Create a queued publish with a specific timestamp (for testing).
    #[cfg(test)]
    pub fn with_timestamp(topic: String, payload: Vec<u8>, queued_at: Instant) -> Self {
        Self {
            topic,
            payload,
            queued_at,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns true if this publish is older than `ttl`.
    pub fn is_expired_after(&self, ttl: Duration) -> bool {
        self.queued_at.elapsed() > ttl
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.topic, self.payload)
    }
}

/// Bounded FIFO of [`QueuedPublish`].
#[derive(Debug)]
pub struct PublishQueue {
    items: VecDeque<QueuedPublish>,
    capacity: usize,
    ttl: Duration,
}

impl PublishQueue {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            ttl,
        }
    }

    /// Append a publish.
    ///
    /// Expired entries are pruned first; if the queue is still full the
    /// publish is handed back.
    pub fn push(&mut self, item: QueuedPublish) -> Result<usize, QueuedPublish> {
        if self.items.len() >= self.capacity {
            self.prune_expired();
        }
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.items.len();
        let ttl = self.ttl;
        self.items.retain(|item| !item.is_expired_after(ttl));
        before - self.items.len()
    }

    /// Take every publish still worth sending, in queue order, along with
    /// the number of expired entries that were discarded.
    pub fn drain_ready(&mut self) -> (Vec<QueuedPublish>, usize) {
        let expired = self.prune_expired();
        (self.items.drain(..).collect(), expired)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PublishQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, QUEUE_MESSAGE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(text: &str) -> QueuedPublish {
        QueuedPublish::new("user/topic".to_string(), text.as_bytes().to_vec())
    }

    fn old_publish(text: &str) -> QueuedPublish {
        let old_time = Instant::now() - QUEUE_MESSAGE_TTL - Duration::from_secs(1);
        QueuedPublish::with_timestamp("user/topic".to_string(), text.as_bytes().to_vec(), old_time)
    }

    #[test]
    fn test_new_publish_not_expired() {
        let msg = publish("hello");
        assert!(!msg.is_expired_after(QUEUE_MESSAGE_TTL));
        assert_eq!(msg.topic(), "user/topic");
        assert_eq!(msg.payload(), b"hello");
    }

    #[test]
    fn test_is_expired_after_custom_duration() {
        let old_time = Instant::now() - Duration::from_secs(5);
        let msg = QueuedPublish::with_timestamp("a/b".into(), vec![], old_time);
        assert!(msg.is_expired_after(Duration::from_secs(3)));
        assert!(!msg.is_expired_after(Duration::from_secs(10)));
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PublishQueue::default();
        assert_eq!(queue.push(publish("1")).unwrap(), 1);
        queue.push(publish("2")).unwrap();
        queue.push(publish("3")).unwrap();

        let (ready, expired) = queue.drain_ready();
        assert_eq!(expired, 0);
        let payloads: Vec<&[u8]> = ready.iter().map(|m| m.payload()).collect();
        assert_eq!(payloads, vec![b"1" as &[u8], b"2", b"3"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let mut queue = PublishQueue::new(2, QUEUE_MESSAGE_TTL);
        queue.push(publish("a")).unwrap();
        queue.push(publish("b")).unwrap();
        let rejected = queue.push(publish("c")).unwrap_err();
        assert_eq!(rejected.payload(), b"c");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_full_queue_makes_room_from_expired() {
        let mut queue = PublishQueue::new(2, QUEUE_MESSAGE_TTL);
        queue.push(old_publish("stale")).unwrap();
        queue.push(publish("fresh")).unwrap();
        assert_eq!(queue.push(publish("new")).unwrap(), 2);
    }

    #[test]
    fn test_drain_drops_expired() {
        let mut queue = PublishQueue::default();
        queue.push(old_publish("stale")).unwrap();
        queue.push(publish("fresh")).unwrap();

        let (ready, expired) = queue.drain_ready();
        assert_eq!(expired, 1);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].payload(), b"fresh");
    }

    #[test]
    fn test_into_parts() {
        let (topic, payload) = publish("x").into_parts();
        assert_eq!(topic, "user/topic");
        assert_eq!(payload, b"x");
    }

    #[test]
    fn test_queue_constants() {
        assert_eq!(QUEUE_MESSAGE_TTL, Duration::from_secs(60));
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 32);
        assert_eq!(PublishQueue::default().capacity(), DEFAULT_QUEUE_CAPACITY);
    }
}
