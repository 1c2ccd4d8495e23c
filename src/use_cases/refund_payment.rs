use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::UseCaseError;
use super::reference::PaymentReference;
use super::support::apply_transition;
use crate::domain::{Clock, Payment};
use crate::events::EventDispatcher;
use crate::ports::PaymentRepository;

pub struct RefundPayment {
    repository: Arc<dyn PaymentRepository>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl RefundPayment {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            clock,
        }
    }

    pub async fn execute(&self, reference: &PaymentReference) -> Result<DateTime<Utc>, UseCaseError> {
        let (payment, refunded_at) = apply_transition(
            self.repository.as_ref(),
            &self.dispatcher,
            self.clock.as_ref(),
            reference,
            Payment::refund,
        )
        .await?;

        info!(payment_id = %payment.id(), %refunded_at, "Payment refunded");
        Ok(refunded_at)
    }
}
