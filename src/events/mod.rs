//! In-process pub/sub for payment domain events.
//!
//! Handlers are registered once at start-up, then the dispatcher is shared
//! behind an `Arc` and only read. Dispatch awaits each handler in registration
//! order; a failing handler is logged and does not stop the others.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::PaymentEvent;

/// Registration key that receives every event.
pub const ALL_EVENTS: &str = "*";

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &PaymentEvent) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_name: &str, handler: Arc<dyn EventHandler>) {
        self.handlers.push((event_name.to_string(), handler));
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers
            .iter()
            .filter(|(name, _)| name == event_name)
            .count()
    }

    pub async fn dispatch(&self, event: &PaymentEvent) {
        let matching = self
            .handlers
            .iter()
            .filter(|(name, _)| name == event.name() || name == ALL_EVENTS)
            .map(|(_, handler)| handler);

        for handler in matching {
            if let Err(e) = handler.handle(event).await {
                error!(
                    event = event.name(),
                    payment_id = %event.payment_id(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }

    pub async fn dispatch_all(&self, events: Vec<PaymentEvent>) {
        for event in &events {
            self.dispatch(event).await;
        }
    }
}

/// Writes every payment event to the log.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: &PaymentEvent) -> anyhow::Result<()> {
        info!(
            event = event.name(),
            payment_id = %event.payment_id(),
            occurred_at = %event.occurred_at(),
            "Payment event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &PaymentEvent) -> anyhow::Result<()> {
            self.seen
                .lock()
                .await
                .push(format!("{}:{}", self.tag, event.name()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &PaymentEvent) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn canceled() -> PaymentEvent {
        PaymentEvent::Canceled {
            payment_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_follows_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(
            ALL_EVENTS,
            Arc::new(Recorder { tag: "all", seen: seen.clone() }),
        );
        dispatcher.register(
            PaymentEvent::CANCELED,
            Arc::new(Recorder { tag: "cancel", seen: seen.clone() }),
        );
        dispatcher.register(
            PaymentEvent::PAID,
            Arc::new(Recorder { tag: "paid", seen: seen.clone() }),
        );

        dispatcher.dispatch(&canceled()).await;

        assert_eq!(
            *seen.lock().await,
            vec!["all:payment.canceled", "cancel:payment.canceled"]
        );
    }

    #[tokio::test]
    async fn test_wildcard_registered_last_runs_last() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(
            PaymentEvent::CANCELED,
            Arc::new(Recorder { tag: "first", seen: seen.clone() }),
        );
        dispatcher.register(
            ALL_EVENTS,
            Arc::new(Recorder { tag: "all", seen: seen.clone() }),
        );
        dispatcher.register(
            PaymentEvent::CANCELED,
            Arc::new(Recorder { tag: "last", seen: seen.clone() }),
        );

        dispatcher.dispatch(&canceled()).await;

        assert_eq!(
            *seen.lock().await,
            vec![
                "first:payment.canceled",
                "all:payment.canceled",
                "last:payment.canceled"
            ]
        );
        assert_eq!(dispatcher.handler_count(ALL_EVENTS), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(PaymentEvent::CANCELED, Arc::new(Failing));
        dispatcher.register(
            PaymentEvent::CANCELED,
            Arc::new(Recorder { tag: "after", seen: seen.clone() }),
        );

        dispatcher.dispatch_all(vec![canceled(), canceled()]).await;

        assert_eq!(seen.lock().await.len(), 2);
        assert_eq!(dispatcher.handler_count(PaymentEvent::CANCELED), 2);
    }
}
