//! Turns a provider webhook action into the matching payment transition.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::cancel_payment::CancelPayment;
use super::error::UseCaseError;
use super::mark_as_paid::MarkAsPaid;
use super::notify_payment::NotifyPaymentPaid;
use super::reference::PaymentReference;
use super::refund_payment::RefundPayment;
use crate::domain::{PaymentError, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAction {
    Processed,
    Refunded,
    Canceled,
    Expired,
}

impl ProviderAction {
    pub fn parse(action: &str) -> Result<Self, UseCaseError> {
        match action {
            "order.processed" => Ok(Self::Processed),
            "order.refunded" => Ok(Self::Refunded),
            "order.canceled" => Ok(Self::Canceled),
            "order.expired" => Ok(Self::Expired),
            other => Err(UseCaseError::CannotProcess(format!(
                "unsupported action {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "order.processed",
            Self::Refunded => "order.refunded",
            Self::Canceled => "order.canceled",
            Self::Expired => "order.expired",
        }
    }

    pub fn target_status(&self) -> PaymentStatus {
        match self {
            Self::Processed => PaymentStatus::Paid,
            Self::Refunded => PaymentStatus::Refunded,
            Self::Canceled | Self::Expired => PaymentStatus::Canceled,
        }
    }
}

impl fmt::Display for ProviderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: PaymentStatus,
    pub at: DateTime<Utc>,
}

pub struct ProcessPayment {
    mark_as_paid: Arc<MarkAsPaid>,
    cancel: Arc<CancelPayment>,
    refund: Arc<RefundPayment>,
    notify: Arc<NotifyPaymentPaid>,
}

impl ProcessPayment {
    pub fn new(
        mark_as_paid: Arc<MarkAsPaid>,
        cancel: Arc<CancelPayment>,
        refund: Arc<RefundPayment>,
        notify: Arc<NotifyPaymentPaid>,
    ) -> Self {
        Self {
            mark_as_paid,
            cancel,
            refund,
            notify,
        }
    }

    pub async fn execute(
        &self,
        reference: &PaymentReference,
        action: &str,
    ) -> Result<ProcessOutcome, UseCaseError> {
        let action = ProviderAction::parse(action)?;
        self.execute_action(reference, &action).await
    }

    pub async fn execute_action(
        &self,
        reference: &PaymentReference,
        action: &ProviderAction,
    ) -> Result<ProcessOutcome, UseCaseError> {
        let status = action.target_status();
        info!(%reference, %action, target = %status, "Processing payment action");

        let at = match status {
            PaymentStatus::Paid => match self.mark_as_paid.execute(reference).await {
                Ok(paid_at) => {
                    self.notify.execute(reference).await?;
                    paid_at
                }
                Err(UseCaseError::Payment(PaymentError::AlreadyPaid)) => {
                    // A redelivery may follow a publish that never went out.
                    self.notify.execute(reference).await?;
                    return Err(PaymentError::AlreadyPaid.into());
                }
                Err(e) => return Err(e),
            },
            PaymentStatus::Canceled => self.cancel.execute(reference, action.as_str()).await?,
            PaymentStatus::Refunded => self.refund.execute(reference).await?,
            PaymentStatus::Pending => {
                return Err(UseCaseError::CannotProcess(format!(
                    "no transition leads to {}",
                    status
                )))
            }
        };

        Ok(ProcessOutcome { status, at })
    }
}
