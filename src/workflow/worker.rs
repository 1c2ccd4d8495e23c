use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::activities::{ActivityError, PaymentActivities, RetryPolicy};
use super::definition::{next_step, WorkflowStep};
use super::{WorkflowInstance, WorkflowOutcome};
use crate::domain::Clock;
use crate::ports::WorkflowStore;

const DEFAULT_BATCH_SIZE: i64 = 10;
const DEFAULT_LEASE_SECS: i64 = 60;

/// Polls the workflow table and drives every ready instance to a terminal state.
/// Several workers may run side by side; the store lease keeps them apart.
pub struct WorkflowWorker {
    store: Arc<dyn WorkflowStore>,
    activities: Arc<dyn PaymentActivities>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    lease: ChronoDuration,
    batch_size: i64,
}

impl WorkflowWorker {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        activities: Arc<dyn PaymentActivities>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            activities,
            clock,
            retry: RetryPolicy::default(),
            lease: ChronoDuration::seconds(DEFAULT_LEASE_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Claims one batch and runs it. Returns how many instances were claimed.
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();
        let claimed = self
            .store
            .claim_due(now, now + self.lease, self.batch_size)
            .await?;

        if claimed.is_empty() {
            return Ok(0);
        }
        debug!("Running {} workflow instance(s)", claimed.len());

        for instance in &claimed {
            if let Err(e) = self.run_instance(instance).await {
                error!(workflow_id = %instance.workflow_id, error = %e, "Workflow step failed to persist");
            }
        }

        Ok(claimed.len())
    }

    async fn run_instance(&self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        let payment_id = instance.payment_id;

        let outcome = match next_step(instance, self.clock.now()) {
            WorkflowStep::Wait => {
                warn!(workflow_id = %instance.workflow_id, "Claimed workflow has nothing to do");
                return Ok(());
            }
            WorkflowStep::MarkPaid => match self.confirm(instance).await {
                Ok(Some(outcome)) => Ok(outcome),
                Ok(None) => return Ok(()),
                Err(e) => Err(e),
            },
            WorkflowStep::Cancel { reason, outcome } => self
                .retry
                .run("cancel_payment", || self.activities.cancel(payment_id, &reason))
                .await
                .map(|_| outcome),
        };

        let at = self.clock.now();
        match outcome {
            Ok(outcome) => {
                self.store
                    .complete(&instance.workflow_id, outcome, at)
                    .await?;
                info!(
                    workflow_id = %instance.workflow_id,
                    payment_id = %payment_id,
                    outcome = %outcome,
                    "Payment workflow completed"
                );
            }
            Err(e) => {
                self.store
                    .fail(&instance.workflow_id, &e.to_string(), at)
                    .await?;
                error!(
                    workflow_id = %instance.workflow_id,
                    payment_id = %payment_id,
                    error = %e,
                    "Payment workflow failed"
                );
            }
        }
        Ok(())
    }

    /// Marks the payment paid, then makes sure the paid message went out.
    /// Returns `None` when the notification could not be sent; the instance
    /// keeps its lease and is picked up again once the lease lapses.
    async fn confirm(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<Option<WorkflowOutcome>, ActivityError> {
        let payment_id = instance.payment_id;
        let paid_at = self
            .retry
            .run("mark_payment_paid", || self.activities.mark_paid(payment_id))
            .await?;
        if paid_at.is_none() {
            debug!(payment_id = %payment_id, "Payment was already paid");
        }

        match self
            .retry
            .run("notify_payment_paid", || self.activities.notify_paid(payment_id))
            .await
        {
            Ok(()) => Ok(Some(WorkflowOutcome::Paid)),
            Err(ActivityError::Retryable(e)) => {
                warn!(
                    workflow_id = %instance.workflow_id,
                    payment_id = %payment_id,
                    error = %e,
                    "Paid notification deferred until the lease lapses"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs the workflow worker loop until the task is dropped.
pub async fn run_workflow_worker(worker: WorkflowWorker, poll_interval: Duration) {
    info!("Payment workflow worker started");

    loop {
        match worker.tick().await {
            Ok(claimed) if claimed > 0 => continue,
            Ok(_) => {}
            Err(e) => error!("Workflow worker batch error: {}", e),
        }

        sleep(poll_interval).await;
    }
}
