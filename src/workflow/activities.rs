use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::PaymentError;
use crate::use_cases::{
    CancelPayment, MarkAsPaid, NotifyPaymentPaid, PaymentReference, UseCaseError,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    #[error("retryable activity failure: {0}")]
    Retryable(String),

    #[error("activity failed: {0}")]
    NonRetryable(String),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Retryable(_))
    }
}

impl From<UseCaseError> for ActivityError {
    fn from(err: UseCaseError) -> Self {
        if err.is_business() {
            ActivityError::NonRetryable(err.to_string())
        } else {
            ActivityError::Retryable(err.to_string())
        }
    }
}

/// Side effects the workflow may perform on a payment.
#[async_trait]
pub trait PaymentActivities: Send + Sync {
    /// Returns `None` when the payment was already paid before this call.
    async fn mark_paid(&self, payment_id: Uuid) -> Result<Option<DateTime<Utc>>, ActivityError>;

    async fn cancel(&self, payment_id: Uuid, reason: &str) -> Result<(), ActivityError>;

    /// Publishes the paid message unless it already went out.
    async fn notify_paid(&self, payment_id: Uuid) -> Result<(), ActivityError>;
}

pub struct UseCaseActivities {
    mark_as_paid: Arc<MarkAsPaid>,
    cancel: Arc<CancelPayment>,
    notify: Arc<NotifyPaymentPaid>,
}

impl UseCaseActivities {
    pub fn new(
        mark_as_paid: Arc<MarkAsPaid>,
        cancel: Arc<CancelPayment>,
        notify: Arc<NotifyPaymentPaid>,
    ) -> Self {
        Self {
            mark_as_paid,
            cancel,
            notify,
        }
    }
}

#[async_trait]
impl PaymentActivities for UseCaseActivities {
    async fn mark_paid(&self, payment_id: Uuid) -> Result<Option<DateTime<Utc>>, ActivityError> {
        match self
            .mark_as_paid
            .execute(&PaymentReference::Id(payment_id))
            .await
        {
            Ok(paid_at) => Ok(Some(paid_at)),
            Err(UseCaseError::Payment(PaymentError::AlreadyPaid)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel(&self, payment_id: Uuid, reason: &str) -> Result<(), ActivityError> {
        match self
            .cancel
            .execute(&PaymentReference::Id(payment_id), reason)
            .await
        {
            Ok(_) | Err(UseCaseError::Payment(PaymentError::AlreadyCanceled)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn notify_paid(&self, payment_id: Uuid) -> Result<(), ActivityError> {
        self.notify
            .execute(&PaymentReference::Id(payment_id))
            .await
            .map(|_| ())
            .map_err(ActivityError::from)
    }
}

/// Bounded attempts with exponential backoff. Non-retryable errors stop at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, activity: &str, mut operation: F) -> Result<T, ActivityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        activity,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Activity failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
