//! Queue consumers for the create-payment and process-payment messages.
//!
//! Policy: business failures are acknowledged (retrying cannot change them),
//! infrastructure failures are re-queued with an attempt counter, and a
//! message that runs out of attempts or cannot be parsed is parked on the
//! `{queue}:dead` list.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{IdempotencyKey, SessionId};
use crate::ports::{MessageQueue, PaymentRepository, QueueResult};
use crate::use_cases::support::load_payment;
use crate::use_cases::{
    CreatePayment, CreatePaymentInput, PaymentReference, ProcessPayment, ProviderAction,
    UseCaseError,
};
use crate::workflow::{SignalDelivery, WorkflowError, WorkflowOrchestrator, WorkflowSignal};

pub const PROCESS_PAYMENT_QUEUE: &str = "payments.process";
pub const CREATE_PAYMENT_QUEUE: &str = "payments.create";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const ATTEMPTS_FIELD: &str = "attempts";
const ERROR_FIELD: &str = "lastError";

pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}:dead", queue)
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    UseCase(#[from] UseCaseError),
}

impl From<WorkflowError> for ConsumerError {
    fn from(err: WorkflowError) -> Self {
        ConsumerError::UseCase(UseCaseError::Workflow(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
    DeadLetter,
}

/// `attempts` counts deliveries already made before this one.
pub fn decide(result: &Result<(), ConsumerError>, attempts: u32, max_attempts: u32) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(ConsumerError::Malformed(_)) => Disposition::DeadLetter,
        Err(ConsumerError::UseCase(e)) if e.is_business() => Disposition::Ack,
        Err(ConsumerError::UseCase(_)) if attempts + 1 >= max_attempts => Disposition::DeadLetter,
        Err(ConsumerError::UseCase(_)) => Disposition::Retry,
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> Result<(), ConsumerError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessPaymentMessage {
    payment_reference: String,
    webhook_payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    action: String,
}

/// Routes provider actions. Paid, canceled and expired go to the payment's
/// workflow first; only when no live workflow takes the signal does the
/// transition run directly. Refunds always run directly.
pub struct ProcessPaymentHandler {
    process: Arc<ProcessPayment>,
    repository: Arc<dyn PaymentRepository>,
    workflows: Option<Arc<WorkflowOrchestrator>>,
}

impl ProcessPaymentHandler {
    pub fn new(process: Arc<ProcessPayment>, repository: Arc<dyn PaymentRepository>) -> Self {
        Self {
            process,
            repository,
            workflows: None,
        }
    }

    pub fn with_workflows(mut self, workflows: Arc<WorkflowOrchestrator>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    /// Returns true when the workflow took the signal and nothing else should happen.
    async fn signal_workflow(
        &self,
        workflows: &WorkflowOrchestrator,
        reference: &PaymentReference,
        action: &ProviderAction,
    ) -> Result<bool, ConsumerError> {
        let signal = match action {
            ProviderAction::Processed => WorkflowSignal::Confirmed,
            ProviderAction::Canceled | ProviderAction::Expired => {
                WorkflowSignal::failed(Some(action.as_str()))
            }
            ProviderAction::Refunded => return Ok(false),
        };

        let payment = load_payment(self.repository.as_ref(), reference).await?;
        match workflows
            .signal_for_key(&payment.idempotency_key(), signal)
            .await
        {
            Ok(SignalDelivery::Accepted) => Ok(true),
            Ok(SignalDelivery::Superseded) => {
                debug!(%reference, %action, "Workflow already holds a signal, dropping action");
                Ok(true)
            }
            Ok(SignalDelivery::Finished) | Err(WorkflowError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageHandler for ProcessPaymentHandler {
    async fn handle(&self, payload: &Value) -> Result<(), ConsumerError> {
        let message: ProcessPaymentMessage = serde_json::from_value(payload.clone())?;
        let reference = PaymentReference::parse(&message.payment_reference);
        let action = ProviderAction::parse(&message.webhook_payload.action)?;

        if let Some(workflows) = &self.workflows {
            if self.signal_workflow(workflows, &reference, &action).await? {
                return Ok(());
            }
        }

        let outcome = self.process.execute_action(&reference, &action).await?;
        info!(%reference, %action, status = %outcome.status, "Payment action processed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentMessage {
    session_id: SessionId,
    idempotency_key: IdempotencyKey,
}

pub struct CreatePaymentHandler {
    create: Arc<CreatePayment>,
}

impl CreatePaymentHandler {
    pub fn new(create: Arc<CreatePayment>) -> Self {
        Self { create }
    }
}

#[async_trait]
impl MessageHandler for CreatePaymentHandler {
    async fn handle(&self, payload: &Value) -> Result<(), ConsumerError> {
        let message: CreatePaymentMessage = serde_json::from_value(payload.clone())?;
        let output = self
            .create
            .execute(CreatePaymentInput {
                session_id: message.session_id,
                idempotency_key: message.idempotency_key,
            })
            .await?;
        info!(payment_id = %output.payment_id, "Payment created from queue");
        Ok(())
    }
}

pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    name: String,
    handler: Arc<dyn MessageHandler>,
    max_attempts: u32,
    wait: Duration,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            queue,
            name: name.into(),
            handler,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait: Duration::from_secs(5),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes at most one message. `None` means the queue stayed empty.
    pub async fn poll_once(&self) -> QueueResult<Option<Disposition>> {
        let Some(raw) = self.queue.receive(&self.name, self.wait).await? else {
            return Ok(None);
        };

        let mut payload = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Unparseable message, dead-lettering");
                self.queue
                    .publish(
                        &dead_letter_queue(&self.name),
                        &serde_json::json!({ "raw": raw, ERROR_FIELD: e.to_string() }),
                    )
                    .await?;
                return Ok(Some(Disposition::DeadLetter));
            }
        };

        let attempts = payload
            .get(ATTEMPTS_FIELD)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let result = self.handler.handle(&payload).await;
        let disposition = decide(&result, attempts, self.max_attempts);

        match (&disposition, &result) {
            (Disposition::Ack, Err(e)) => {
                warn!(queue = %self.name, error = %e, "Business failure, acknowledging message");
            }
            (Disposition::Ack, Ok(())) => {}
            (Disposition::Retry, _) => {
                let error = result.as_ref().err().map(ToString::to_string);
                warn!(queue = %self.name, attempts = attempts + 1, error = ?error, "Re-queueing message");
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert(ATTEMPTS_FIELD.to_string(), Value::from(attempts + 1));
                    obj.insert(ERROR_FIELD.to_string(), Value::from(error));
                }
                self.queue.publish(&self.name, &payload).await?;
            }
            (Disposition::DeadLetter, _) => {
                let error = result.as_ref().err().map(ToString::to_string);
                error!(queue = %self.name, attempts = attempts + 1, error = ?error, "Dead-lettering message");
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert(ATTEMPTS_FIELD.to_string(), Value::from(attempts + 1));
                    obj.insert(ERROR_FIELD.to_string(), Value::from(error));
                }
                self.queue
                    .publish(&dead_letter_queue(&self.name), &payload)
                    .await?;
            }
        }

        Ok(Some(disposition))
    }
}

/// Runs a consumer until the task is dropped.
pub async fn run_consumer(consumer: QueueConsumer) {
    info!(queue = %consumer.name(), "Queue consumer started");

    loop {
        if let Err(e) = consumer.poll_once().await {
            error!(queue = %consumer.name(), "Queue consumer error: {}", e);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// Moves everything from `{queue}:dead` back onto `queue` with a fresh attempt counter.
pub async fn requeue_dead_letters(queue: &dyn MessageQueue, name: &str) -> QueueResult<usize> {
    let dead = dead_letter_queue(name);
    let mut moved = 0;

    while let Some(raw) = queue.receive(&dead, Duration::from_millis(1)).await? {
        let mut payload: Value = serde_json::from_str(&raw)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.remove(ATTEMPTS_FIELD);
            obj.remove(ERROR_FIELD);
        }
        queue.publish(name, &payload).await?;
        moved += 1;
    }

    info!(queue = name, moved, "Dead letters re-queued");
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentError;
    use crate::ports::RepositoryError;

    fn business() -> Result<(), ConsumerError> {
        Err(UseCaseError::Payment(PaymentError::AlreadyPaid).into())
    }

    fn infrastructure() -> Result<(), ConsumerError> {
        Err(UseCaseError::Persistence(RepositoryError::Corrupt("db down".into())).into())
    }

    #[test]
    fn test_success_acks() {
        assert_eq!(decide(&Ok(()), 0, 5), Disposition::Ack);
    }

    #[test]
    fn test_business_error_acks() {
        assert_eq!(decide(&business(), 0, 5), Disposition::Ack);
        assert_eq!(decide(&business(), 4, 5), Disposition::Ack);
    }

    #[test]
    fn test_infrastructure_error_retries_then_dead_letters() {
        assert_eq!(decide(&infrastructure(), 0, 5), Disposition::Retry);
        assert_eq!(decide(&infrastructure(), 3, 5), Disposition::Retry);
        assert_eq!(decide(&infrastructure(), 4, 5), Disposition::DeadLetter);
    }

    #[test]
    fn test_malformed_dead_letters() {
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(
            decide(&Err(ConsumerError::Malformed(err)), 0, 5),
            Disposition::DeadLetter
        );
    }

    #[test]
    fn test_dead_letter_name() {
        assert_eq!(dead_letter_queue(PROCESS_PAYMENT_QUEUE), "payments.process:dead");
    }
}
