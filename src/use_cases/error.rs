use thiserror::Error;

use crate::domain::{IdempotencyKey, PaymentError, SessionId};
use crate::ports::{GatewayError, QueueError, RepositoryError};
use crate::workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    #[error("payment already exists for idempotency key {0}")]
    PaymentAlreadyExists(IdempotencyKey),

    #[error("cart for session {0} is empty")]
    EmptyCart(SessionId),

    #[error("cannot process payment: {0}")]
    CannotProcess(String),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

impl UseCaseError {
    /// Expected outcomes of the business rules. Transports acknowledge these
    /// instead of retrying; everything else is infrastructure trouble.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            UseCaseError::Payment(_)
                | UseCaseError::PaymentNotFound(_)
                | UseCaseError::PaymentAlreadyExists(_)
                | UseCaseError::EmptyCart(_)
                | UseCaseError::CannotProcess(_)
        )
    }

    pub fn is_already_in_state(&self) -> bool {
        matches!(self, UseCaseError::Payment(e) if e.is_already_in_state())
    }
}
