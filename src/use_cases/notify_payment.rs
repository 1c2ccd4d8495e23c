use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::UseCaseError;
use super::reference::PaymentReference;
use super::support::{apply_transition, execute_all_or_fail, load_payment};
use crate::domain::{Clock, Payment, PaymentError};
use crate::events::EventDispatcher;
use crate::ports::{PaymentRepository, QueuePublisher};

pub const PAYMENT_PAID_QUEUE: &str = "orders.payment-paid";

/// Downstream notification sent once a payment is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPaidMessage {
    pub payment_id: Uuid,
    pub external_payment_id: Option<String>,
    pub session_id: String,
    pub amount: BigDecimal,
    pub paid_at: DateTime<Utc>,
}

/// Publishes the paid notification until the payment records it as sent.
/// A redelivery after a failed publish sends it; one after a successful
/// publish does nothing. Consumers dedupe on `paymentId`.
pub struct NotifyPaymentPaid {
    repository: Arc<dyn PaymentRepository>,
    publisher: Arc<dyn QueuePublisher>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
    queues: Vec<String>,
}

impl NotifyPaymentPaid {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        publisher: Arc<dyn QueuePublisher>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            publisher,
            dispatcher,
            clock,
            queues: vec![PAYMENT_PAID_QUEUE.to_string()],
        }
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    /// Returns false when the notification had already been sent.
    pub async fn execute(&self, reference: &PaymentReference) -> Result<bool, UseCaseError> {
        let payment = load_payment(self.repository.as_ref(), reference).await?;
        if payment.notified_at().is_some() {
            debug!(payment_id = %payment.id(), "Paid notification already sent");
            return Ok(false);
        }
        let paid_at = payment
            .paid_at()
            .ok_or(UseCaseError::Payment(PaymentError::NotPaid))?;

        let message = serde_json::to_value(PaymentPaidMessage {
            payment_id: payment.id(),
            external_payment_id: payment
                .provider()
                .map(|p| p.external_payment_id().to_string()),
            session_id: payment.session_id().to_string(),
            amount: payment.amount().clone(),
            paid_at,
        })
        .map_err(crate::ports::QueueError::from)?;

        let publishes: Vec<_> = self
            .queues
            .iter()
            .map(|queue| self.publisher.publish(queue, &message))
            .collect();
        execute_all_or_fail(publishes).await?;

        match apply_transition(
            self.repository.as_ref(),
            &self.dispatcher,
            self.clock.as_ref(),
            &PaymentReference::Id(payment.id()),
            Payment::mark_notified,
        )
        .await
        {
            Ok(_) | Err(UseCaseError::Payment(PaymentError::AlreadyNotified)) => {}
            Err(e) => return Err(e),
        }

        info!(payment_id = %payment.id(), queues = ?self.queues, "Payment paid notification published");
        Ok(true)
    }
}
