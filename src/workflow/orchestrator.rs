use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{WorkflowError, WorkflowInstance, WorkflowOutcome, WorkflowSignal, WorkflowStatus};
use crate::domain::{Clock, IdempotencyKey};
use crate::ports::WorkflowStore;

pub const DEFAULT_TIMEOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct StartPaymentWorkflow {
    pub payment_id: Uuid,
    pub idempotency_key: IdempotencyKey,
    /// Overrides the orchestrator default when set.
    pub timeout_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub payment_id: Uuid,
    pub status: WorkflowStatus,
    /// True when the id was already taken and nothing new was started.
    pub already_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Accepted,
    /// Another signal got there first; the new one is dropped.
    Superseded,
    /// The workflow already finished; the caller must act on its own.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowResult {
    Pending,
    Completed(WorkflowOutcome),
    Failed(String),
}

pub fn workflow_id_for(idempotency_key: &IdempotencyKey) -> String {
    format!("payment-{}", idempotency_key)
}

pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    default_timeout_minutes: i64,
}

impl WorkflowOrchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }

    pub fn with_default_timeout(mut self, minutes: i64) -> Self {
        self.default_timeout_minutes = minutes;
        self
    }

    /// Idempotent on the workflow id: a second start returns the existing instance.
    pub async fn start(
        &self,
        request: StartPaymentWorkflow,
    ) -> Result<WorkflowHandle, WorkflowError> {
        let workflow_id = workflow_id_for(&request.idempotency_key);
        let now = self.clock.now();
        let timeout = request
            .timeout_minutes
            .unwrap_or(self.default_timeout_minutes);
        let instance = WorkflowInstance::new(
            workflow_id.clone(),
            request.payment_id,
            now,
            self.clock.add_minutes(now, timeout),
        );

        if self.store.insert(&instance).await? {
            info!(
                workflow_id = %workflow_id,
                payment_id = %request.payment_id,
                deadline = %instance.deadline,
                "Payment workflow started"
            );
            return Ok(WorkflowHandle {
                workflow_id,
                payment_id: request.payment_id,
                status: WorkflowStatus::Running,
                already_running: false,
            });
        }

        let existing = self.describe(&workflow_id).await?;
        debug!(workflow_id = %workflow_id, status = %existing.status, "Payment workflow already exists");
        Ok(WorkflowHandle {
            workflow_id,
            payment_id: existing.payment_id,
            status: existing.status,
            already_running: true,
        })
    }

    pub async fn signal(
        &self,
        workflow_id: &str,
        signal: WorkflowSignal,
    ) -> Result<SignalDelivery, WorkflowError> {
        let now = self.clock.now();
        if self.store.record_signal(workflow_id, &signal, now).await? {
            info!(workflow_id, signal = signal.name(), "Workflow signal accepted");
            return Ok(SignalDelivery::Accepted);
        }

        let instance = self.describe(workflow_id).await?;
        let delivery = if instance.status.is_terminal() {
            SignalDelivery::Finished
        } else {
            SignalDelivery::Superseded
        };
        debug!(
            workflow_id,
            signal = signal.name(),
            status = %instance.status,
            ?delivery,
            "Workflow signal not recorded"
        );
        Ok(delivery)
    }

    pub async fn signal_for_key(
        &self,
        idempotency_key: &IdempotencyKey,
        signal: WorkflowSignal,
    ) -> Result<SignalDelivery, WorkflowError> {
        self.signal(&workflow_id_for(idempotency_key), signal).await
    }

    pub async fn describe(&self, workflow_id: &str) -> Result<WorkflowInstance, WorkflowError> {
        self.store
            .get(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    pub async fn result(&self, workflow_id: &str) -> Result<WorkflowResult, WorkflowError> {
        let instance = self.describe(workflow_id).await?;
        Ok(match (instance.status, instance.outcome, instance.error) {
            (WorkflowStatus::Completed, Some(outcome), _) => WorkflowResult::Completed(outcome),
            (WorkflowStatus::Failed, _, error) => {
                WorkflowResult::Failed(error.unwrap_or_else(|| "unknown error".to_string()))
            }
            _ => WorkflowResult::Pending,
        })
    }
}
