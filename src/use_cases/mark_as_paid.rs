use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::UseCaseError;
use super::reference::PaymentReference;
use super::support::apply_transition;
use crate::domain::{Clock, Payment};
use crate::events::EventDispatcher;
use crate::ports::PaymentRepository;

pub struct MarkAsPaid {
    repository: Arc<dyn PaymentRepository>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl MarkAsPaid {
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

    /// Returns the instant the payment was marked paid.
    pub async fn execute(&self, reference: &PaymentReference) -> Result<DateTime<Utc>, UseCaseError> {
        let (payment, paid_at) = apply_transition(
            self.repository.as_ref(),
            &self.dispatcher,
            self.clock.as_ref(),
            reference,
            Payment::paid,
        )
        .await?;

        info!(payment_id = %payment.id(), %paid_at, "Payment marked as paid");
        Ok(paid_at)
    }
}
