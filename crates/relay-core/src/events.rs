//! Delivery events and subscriber plumbing.
//!
//! The delivery engine emits a `DeliveryEvent` for every success, every
//! failed attempt and every exhausted message. Subscribers implement
//! `EventHandler`; `StatsCollector` is the in-process counter sink and
//! `MulticastEventHandler` fans events out to several subscribers.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageId;

/// Events emitted by the delivery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    /// Every body of a message was acknowledged.
    Succeeded(DeliverySucceededEvent),

    /// One delivery attempt failed.
    Failed(DeliveryFailedEvent),

    /// The retry limit was reached.
    Exhausted(DeliveryExhaustedEvent),
}

/// A message was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySucceededEvent {
    /// Message the bodies belong to.
    pub message_id: MessageId,
    /// Endpoint of the last body sent.
    pub endpoint: String,
    /// Status of the last acknowledged body.
    pub status_code: u16,
    /// Attempts used, 1-based.
    pub attempts: u32,
    /// Time from the first attempt to the final acknowledgement, backoff
    /// waits included.
    pub elapsed: Duration,
    /// When the last body was acknowledged.
    pub delivered_at: DateTime<Utc>,
}

/// One attempt for a message failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailedEvent {
    /// Message being delivered.
    pub message_id: MessageId,
    /// Endpoint the attempt failed against.
    pub endpoint: String,
    /// Status code, 0 when the endpoint never answered.
    pub status_code: u16,
    /// Attempt number, 1-based.
    pub attempt: u32,
    /// Classified error text.
    pub error_message: String,
    /// When the attempt failed.
    pub failed_at: DateTime<Utc>,
}

/// A message gave up after its retry limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryExhaustedEvent {
    /// Message that was given up on.
    pub message_id: MessageId,
    /// Endpoint of the final failed attempt.
    pub endpoint: String,
    /// Last status code, 0 when the endpoint never answered.
    pub status_code: u16,
    /// Attempts made.
    pub attempts: u32,
    /// Error of the final attempt.
    pub error_message: String,
}

/// Subscriber for delivery events.
///
/// Handlers must not block delivery; failures inside a handler are the
/// handler's to log.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    async fn handle_event(&self, event: DeliveryEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {}
}

/// Forwards events to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Registers a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        let deliveries = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move { handler.handle_event(event).await }
        });

        futures::future::join_all(deliveries).await;
    }
}

/// Snapshot of delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Failed attempts across all messages.
    pub failure_messages: u64,
    /// Messages delivered.
    pub successes: u64,
    /// Messages that hit the retry limit.
    pub exhausted: u64,
}

/// Counts delivery events.
#[derive(Debug, Default)]
pub struct StatsCollector {
    failure_messages: AtomicU64,
    successes: AtomicU64,
    exhausted: AtomicU64,
}

impl StatsCollector {
    /// Creates a collector with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            failure_messages: self.failure_messages.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for StatsCollector {
    async fn handle_event(&self, event: DeliveryEvent) {
        let counter = match event {
            DeliveryEvent::Succeeded(_) => &self.successes,
            DeliveryEvent::Failed(_) => &self.failure_messages,
            DeliveryEvent::Exhausted(_) => &self.exhausted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_event(attempt: u32) -> DeliveryEvent {
        DeliveryEvent::Failed(DeliveryFailedEvent {
            message_id: MessageId::from("m-1"),
            endpoint: "http://127.0.0.1/nova".to_string(),
            status_code: 503,
            attempt,
            error_message: "service unavailable".to_string(),
            failed_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn no_op_handler_discards_events() {
        NoOpEventHandler::new().handle_event(failed_event(1)).await;
    }

    #[tokio::test]
    async fn stats_collector_counts_by_kind() {
        let stats = StatsCollector::new();

        stats.handle_event(failed_event(1)).await;
        stats.handle_event(failed_event(2)).await;
        stats
            .handle_event(DeliveryEvent::Exhausted(DeliveryExhaustedEvent {
                message_id: MessageId::from("m-1"),
                endpoint: "http://127.0.0.1/nova".to_string(),
                status_code: 503,
                attempts: 2,
                error_message: "service unavailable".to_string(),
            }))
            .await;

        assert_eq!(
            stats.snapshot(),
            DeliveryStats { failure_messages: 2, successes: 0, exhausted: 1 }
        );
    }

    #[tokio::test]
    async fn multicast_forwards_to_all_subscribers() {
        let first = Arc::new(StatsCollector::new());
        let second = Arc::new(StatsCollector::new());

        let mut multicast = MulticastEventHandler::new();
        multicast.add_subscriber(first.clone());
        multicast.add_subscriber(second.clone());
        assert_eq!(multicast.subscriber_count(), 2);

        multicast.handle_event(failed_event(1)).await;

        assert_eq!(first.snapshot().failure_messages, 1);
        assert_eq!(second.snapshot().failure_messages, 1);
    }

    #[tokio::test]
    async fn multicast_without_subscribers() {
        MulticastEventHandler::new().handle_event(failed_event(1)).await;
    }
}
