use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{IdempotencyKey, Payment};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("stale write for {id}: expected version {expected}")]
    Conflict { id: String, expected: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a new payment. Fails with `Duplicate` when the idempotency key is taken.
    async fn save(&self, payment: &Payment) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>>;

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<Payment>>;

    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Payment>>;

    /// Writes the payment back if the stored version still matches `payment.version()`,
    /// bumping it by one. A mismatch is `Conflict`.
    async fn update(&self, payment: &Payment) -> RepositoryResult<()>;
}
