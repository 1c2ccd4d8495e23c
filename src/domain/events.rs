use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Something with a stable identity.
pub trait Entity {
    type Id;

    fn id(&self) -> Self::Id;
}

/// An entity that records domain events until its owner drains them.
pub trait EventSource: Entity {
    type Event;

    fn events(&self) -> &[Self::Event];

    fn take_events(&mut self) -> Vec<Self::Event>;
}

/// Append-only buffer of events raised since the last drain.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer<E> {
    events: Vec<E>,
}

impl<E> EventBuffer<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: E) {
        self.events.push(event);
    }

    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Created {
        payment_id: Uuid,
        amount: BigDecimal,
        expires_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    Paid {
        payment_id: Uuid,
        external_payment_id: String,
        occurred_at: DateTime<Utc>,
    },
    Canceled {
        payment_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    Refunded {
        payment_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl PaymentEvent {
    pub const CREATED: &'static str = "payment.created";
    pub const PAID: &'static str = "payment.paid";
    pub const CANCELED: &'static str = "payment.canceled";
    pub const REFUNDED: &'static str = "payment.refunded";

    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::Created { .. } => Self::CREATED,
            PaymentEvent::Paid { .. } => Self::PAID,
            PaymentEvent::Canceled { .. } => Self::CANCELED,
            PaymentEvent::Refunded { .. } => Self::REFUNDED,
        }
    }

    pub fn payment_id(&self) -> Uuid {
        match self {
            PaymentEvent::Created { payment_id, .. }
            | PaymentEvent::Paid { payment_id, .. }
            | PaymentEvent::Canceled { payment_id, .. }
            | PaymentEvent::Refunded { payment_id, .. } => *payment_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::Created { occurred_at, .. }
            | PaymentEvent::Paid { occurred_at, .. }
            | PaymentEvent::Canceled { occurred_at, .. }
            | PaymentEvent::Refunded { occurred_at, .. } => *occurred_at,
        }
    }
}
