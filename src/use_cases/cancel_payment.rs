use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::UseCaseError;
use super::reference::PaymentReference;
use super::support::apply_transition;
use crate::domain::{Clock, Payment};
use crate::events::EventDispatcher;
use crate::ports::PaymentRepository;

pub struct CancelPayment {
    repository: Arc<dyn PaymentRepository>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl CancelPayment {
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

    pub async fn execute(
        &self,
        reference: &PaymentReference,
        reason: &str,
    ) -> Result<DateTime<Utc>, UseCaseError> {
        let (payment, canceled_at) = apply_transition(
            self.repository.as_ref(),
            &self.dispatcher,
            self.clock.as_ref(),
            reference,
            Payment::cancel,
        )
        .await?;

        info!(payment_id = %payment.id(), %canceled_at, reason, "Payment canceled");
        Ok(canceled_at)
    }
}
