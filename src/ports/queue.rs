use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, queue: &str, message: &serde_json::Value) -> QueueResult<()>;
}

/// A queue that can also be drained by a consumer loop.
#[async_trait]
pub trait MessageQueue: QueuePublisher {
    /// Pops the oldest raw message, waiting up to `wait` for one to arrive.
    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<String>>;
}
