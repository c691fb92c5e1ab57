//! Domain event system: decoupled communication between components.
//!
//! Events are published when something interesting happens in a support
//! session. Other components can subscribe to react without tight coupling.

use crate::decision::EscalationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new session was opened
    SessionCreated {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn was appended to a transcript
    TurnRecorded {
        session_id: String,
        seq: u64,
        speaker: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was answered from the FAQ table
    FaqAnswered {
        session_id: String,
        entry_index: usize,
        score: f32,
        timestamp: DateTime<Utc>,
    },

    /// The provider failed and a degraded reply was sent
    ProviderDegraded {
        session_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A session was handed to a human
    SessionEscalated {
        session_id: String,
        ticket_id: u64,
        reason: EscalationReason,
        created: bool,
        timestamp: DateTime<Utc>,
    },

    /// A summary was produced
    SummaryGenerated {
        session_id: String,
        degraded: bool,
        next_actions: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::SessionEscalated {
            session_id: "s1".into(),
            ticket_id: 3,
            reason: EscalationReason::ExplicitRequest,
            created: true,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::SessionEscalated {
                ticket_id, reason, ..
            } => {
                assert_eq!(*ticket_id, 3);
                assert_eq!(*reason, EscalationReason::ExplicitRequest);
            }
            _ => panic!("Expected SessionEscalated event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::SessionCreated {
            session_id: "s1".into(),
            timestamp: Utc::now(),
        });
    }
}
