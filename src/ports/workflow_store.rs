use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repository::RepositoryResult;
use crate::workflow::{WorkflowInstance, WorkflowOutcome, WorkflowSignal};

/// Durable table of payment workflows, polled by the workflow worker.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Returns `false` without touching anything when the id already exists.
    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<bool>;

    async fn get(&self, workflow_id: &str) -> RepositoryResult<Option<WorkflowInstance>>;

    /// Stores the signal only if the instance is running and has none yet.
    async fn record_signal(
        &self,
        workflow_id: &str,
        signal: &WorkflowSignal,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Atomically leases up to `limit` instances that are ready to act: running
    /// with a signal or a passed deadline, or executing with an expired lease.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowInstance>>;

    async fn complete(
        &self,
        workflow_id: &str,
        outcome: WorkflowOutcome,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn fail(&self, workflow_id: &str, error: &str, at: DateTime<Utc>) -> RepositoryResult<()>;
}
