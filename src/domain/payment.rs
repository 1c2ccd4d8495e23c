//! Payment aggregate.
//! Owns the status state machine; every mutation goes through a named transition.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::clock::Clock;
use super::error::{PaymentError, PaymentResult};
use super::events::{Entity, EventBuffer, EventSource, PaymentEvent};
use super::expiration::ExpirationPolicy;
use super::value_objects::{
    IdempotencyKey, PaymentDetail, PaymentProviderRef, PaymentStatus, PaymentType, SessionId,
};

/// Input for creating a brand new payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: BigDecimal,
    pub payment_type: PaymentType,
    pub idempotency_key: IdempotencyKey,
    pub session_id: SessionId,
}

/// Full state as loaded from storage.
#[derive(Debug, Clone)]
pub struct PersistedPayment {
    pub id: Uuid,
    pub amount: BigDecimal,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub provider: Option<PaymentProviderRef>,
    pub detail: Option<PaymentDetail>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub idempotency_key: IdempotencyKey,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct Payment {
    id: Uuid,
    amount: BigDecimal,
    payment_type: PaymentType,
    status: PaymentStatus,
    expires_at: DateTime<Utc>,
    provider: Option<PaymentProviderRef>,
    detail: Option<PaymentDetail>,
    paid_at: Option<DateTime<Utc>>,
    /// Set once the downstream paid notification went out.
    notified_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    idempotency_key: IdempotencyKey,
    session_id: SessionId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    events: EventBuffer<PaymentEvent>,
}

impl Payment {
    /// Creates a PENDING payment and records `PaymentEvent::Created`.
    pub fn create(
        props: NewPayment,
        clock: &dyn Clock,
        expiration: &ExpirationPolicy,
    ) -> PaymentResult<Self> {
        if props.amount <= BigDecimal::zero() {
            return Err(PaymentError::InvalidAmount(props.amount));
        }

        let now = clock.now();
        let expires_at = expiration.expires_at(clock);
        let id = Uuid::new_v4();

        let mut events = EventBuffer::new();
        events.record(PaymentEvent::Created {
            payment_id: id,
            amount: props.amount.clone(),
            expires_at,
            occurred_at: now,
        });

        Ok(Self {
            id,
            amount: props.amount,
            payment_type: props.payment_type,
            status: PaymentStatus::Pending,
            expires_at,
            provider: None,
            detail: None,
            paid_at: None,
            notified_at: None,
            canceled_at: None,
            refunded_at: None,
            idempotency_key: props.idempotency_key,
            session_id: props.session_id,
            created_at: now,
            updated_at: now,
            version: 0,
            events,
        })
    }

    /// Rebuilds a payment from storage. Records no events.
    pub fn from_persistence(state: PersistedPayment) -> PaymentResult<Self> {
        if state.amount <= BigDecimal::zero() {
            return Err(PaymentError::InvalidAmount(state.amount));
        }

        Ok(Self {
            id: state.id,
            amount: state.amount,
            payment_type: state.payment_type,
            status: state.status,
            expires_at: state.expires_at,
            provider: state.provider,
            detail: state.detail,
            paid_at: state.paid_at,
            notified_at: state.notified_at,
            canceled_at: state.canceled_at,
            refunded_at: state.refunded_at,
            idempotency_key: state.idempotency_key,
            session_id: state.session_id,
            created_at: state.created_at,
            updated_at: state.updated_at,
            version: state.version,
            events: EventBuffer::new(),
        })
    }

    /// Checks run in order: already paid, provider missing, expired.
    pub fn paid(&mut self, now: DateTime<Utc>) -> PaymentResult<()> {
        if self.status == PaymentStatus::Paid {
            return Err(PaymentError::AlreadyPaid);
        }

        let external_payment_id = self
            .provider
            .as_ref()
            .map(|p| p.external_payment_id().to_string())
            .ok_or(PaymentError::ProviderNotSet)?;

        if now > self.expires_at {
            return Err(PaymentError::Expired {
                expires_at: self.expires_at,
            });
        }

        self.status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        self.events.record(PaymentEvent::Paid {
            payment_id: self.id,
            external_payment_id,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> PaymentResult<()> {
        if self.status == PaymentStatus::Canceled {
            return Err(PaymentError::AlreadyCanceled);
        }

        self.status = PaymentStatus::Canceled;
        self.canceled_at = Some(now);
        self.updated_at = now;
        self.events.record(PaymentEvent::Canceled {
            payment_id: self.id,
            occurred_at: now,
        });
        Ok(())
    }

    /// Refunding a PENDING payment is accepted; only a repeated refund is refused.
    pub fn refund(&mut self, now: DateTime<Utc>) -> PaymentResult<()> {
        if self.status == PaymentStatus::Refunded {
            return Err(PaymentError::AlreadyRefunded);
        }

        self.status = PaymentStatus::Refunded;
        self.refunded_at = Some(now);
        self.updated_at = now;
        self.events.record(PaymentEvent::Refunded {
            payment_id: self.id,
            occurred_at: now,
        });
        Ok(())
    }

    /// Records that the paid notification was published. Only a payment that
    /// was paid at some point can be notified, and only once.
    pub fn mark_notified(&mut self, now: DateTime<Utc>) -> PaymentResult<()> {
        if self.notified_at.is_some() {
            return Err(PaymentError::AlreadyNotified);
        }
        if self.paid_at.is_none() {
            return Err(PaymentError::NotPaid);
        }

        self.notified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// True while a paid payment still owes its downstream notification.
    pub fn needs_paid_notification(&self) -> bool {
        self.paid_at.is_some() && self.notified_at.is_none()
    }

    pub fn add_payment_provider(&mut self, provider: PaymentProviderRef) {
        self.provider = Some(provider);
    }

    pub fn add_payment_detail(&mut self, qr_code: impl Into<String>) -> PaymentResult<()> {
        if self.payment_type != PaymentType::Pix {
            return Err(PaymentError::UnsupportedPaymentType(self.payment_type));
        }
        self.detail = Some(PaymentDetail::pix(self.id, qr_code)?);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn provider(&self) -> Option<&PaymentProviderRef> {
        self.provider.as_ref()
    }

    pub fn detail(&self) -> Option<&PaymentDetail> {
        self.detail.as_ref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn notified_at(&self) -> Option<DateTime<Utc>> {
        self.notified_at
    }

    pub fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.canceled_at
    }

    pub fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.idempotency_key
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Version this copy was loaded at; storage rejects updates from stale copies.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Snapshot of the stored state. Pending events are not part of it.
    pub fn to_persistence(&self) -> PersistedPayment {
        PersistedPayment {
            id: self.id,
            amount: self.amount.clone(),
            payment_type: self.payment_type,
            status: self.status,
            expires_at: self.expires_at,
            provider: self.provider.clone(),
            detail: self.detail.clone(),
            paid_at: self.paid_at,
            notified_at: self.notified_at,
            canceled_at: self.canceled_at,
            refunded_at: self.refunded_at,
            idempotency_key: self.idempotency_key,
            session_id: self.session_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

impl Entity for Payment {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        Payment::id(self)
    }
}

impl EventSource for Payment {
    type Event = PaymentEvent;

    fn events(&self) -> &[PaymentEvent] {
        self.events.as_slice()
    }

    fn take_events(&mut self) -> Vec<PaymentEvent> {
        self.events.drain()
    }
}
