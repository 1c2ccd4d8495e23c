use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::value_objects::PaymentType;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Business-rule violations raised by the payment aggregate and its value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment amount must be greater than zero, got {0}")]
    InvalidAmount(BigDecimal),

    #[error("payment is already paid")]
    AlreadyPaid,

    #[error("payment is already canceled")]
    AlreadyCanceled,

    #[error("payment is already refunded")]
    AlreadyRefunded,

    #[error("payment was never paid")]
    NotPaid,

    #[error("paid notification was already sent")]
    AlreadyNotified,

    #[error("payment provider is not set")]
    ProviderNotSet,

    #[error("payment expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("payment type {0} does not support a PIX detail")]
    UnsupportedPaymentType(PaymentType),

    #[error("QR code must not be empty")]
    InvalidQrCode,

    #[error("invalid {field}: {value}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("unknown payment status: {0}")]
    InvalidStatus(String),

    #[error("unknown payment type: {0}")]
    InvalidType(String),
}

impl PaymentError {
    /// Redelivered transitions land here; consumers ack these instead of retrying.
    pub fn is_already_in_state(&self) -> bool {
        matches!(
            self,
            PaymentError::AlreadyPaid | PaymentError::AlreadyCanceled | PaymentError::AlreadyRefunded
        )
    }
}
