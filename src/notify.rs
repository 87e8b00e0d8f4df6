//! Notification sinks
//!
//! The engine writes domain events here and never waits for delivery.

use std::sync::Mutex;

use crate::domain::events::DomainEvent;

pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Writes events to the log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, event: DomainEvent) {
        tracing::info!(subject = event.subject(), event = ?event, "domain event");
    }
}

/// Keeps events in memory; used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, subject: &str) -> usize {
        self.events().iter().filter(|e| e.subject() == subject).count()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

/// Publishes JSON events to NATS under `<prefix>.<subject>`.
pub struct NatsSink {
    client: async_nats::Client,
    prefix: String,
}

impl NatsSink {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

impl NotificationSink for NatsSink {
    fn publish(&self, event: DomainEvent) {
        let subject = format!("{}.{}", self.prefix, event.subject());
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "failed to encode event");
                return;
            }
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(subject = %subject, error = %e, "failed to publish event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use uuid::Uuid;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.publish(DomainEvent::Order(OrderEvent::Cancelled { order_id: Uuid::nil() }));
        sink.publish(DomainEvent::Order(OrderEvent::Refunded { order_id: Uuid::nil() }));
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.count("order.cancelled"), 1);
    }
}
