use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ports::{RepositoryResult, WorkflowStore};
use crate::workflow::{WorkflowInstance, WorkflowOutcome, WorkflowSignal};

const COLUMNS: &str = "workflow_id, payment_id, status, signal, signal_reason, signaled_at, \
                       started_at, deadline, lease_until, outcome, error, updated_at";

/// Workflow instances in `payment_workflows`. Claims use `FOR UPDATE SKIP LOCKED`
/// so several workers can poll the same table.
#[derive(Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_workflows (
                workflow_id, payment_id, status, started_at, deadline, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (workflow_id) DO NOTHING
            "#,
        )
        .bind(&instance.workflow_id)
        .bind(instance.payment_id)
        .bind(instance.status.as_str())
        .bind(instance.started_at)
        .bind(instance.deadline)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, workflow_id: &str) -> RepositoryResult<Option<WorkflowInstance>> {
        let sql = format!(
            "SELECT {} FROM payment_workflows WHERE workflow_id = $1",
            COLUMNS
        );
        let row = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkflowRow::into_domain).transpose()
    }

    async fn record_signal(
        &self,
        workflow_id: &str,
        signal: &WorkflowSignal,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_workflows
            SET signal = $2, signal_reason = $3, signaled_at = $4, updated_at = $4
            WHERE workflow_id = $1 AND status = 'running' AND signal IS NULL
            "#,
        )
        .bind(workflow_id)
        .bind(signal.name())
        .bind(signal.reason())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowInstance>> {
        let sql = format!(
            r#"
            UPDATE payment_workflows
            SET status = 'executing', lease_until = $2, updated_at = $1
            WHERE workflow_id IN (
                SELECT workflow_id FROM payment_workflows
                WHERE (status = 'running' AND (signal IS NOT NULL OR deadline <= $1))
                   OR (status = 'executing' AND (lease_until IS NULL OR lease_until <= $1))
                ORDER BY deadline ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            COLUMNS
        );

        let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
            .bind(now)
            .bind(lease_until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WorkflowRow::into_domain).collect()
    }

    async fn complete(
        &self,
        workflow_id: &str,
        outcome: WorkflowOutcome,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_workflows
            SET status = 'completed', outcome = $2, lease_until = NULL, updated_at = $3
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(outcome.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, workflow_id: &str, error: &str, at: DateTime<Utc>) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_workflows
            SET status = 'failed', error = $2, lease_until = NULL, updated_at = $3
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(error)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkflowRow {
    workflow_id: String,
    payment_id: Uuid,
    status: String,
    signal: Option<String>,
    signal_reason: Option<String>,
    signaled_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    lease_until: Option<DateTime<Utc>>,
    outcome: Option<String>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn into_domain(self) -> RepositoryResult<WorkflowInstance> {
        let signal = self
            .signal
            .as_deref()
            .map(|name| WorkflowSignal::from_parts(name, self.signal_reason.as_deref()))
            .transpose()?;
        let outcome = self
            .outcome
            .as_deref()
            .map(str::parse::<WorkflowOutcome>)
            .transpose()?;

        Ok(WorkflowInstance {
            workflow_id: self.workflow_id,
            payment_id: self.payment_id,
            status: self.status.parse()?,
            signal,
            signaled_at: self.signaled_at,
            started_at: self.started_at,
            deadline: self.deadline,
            lease_until: self.lease_until,
            outcome,
            error: self.error,
            updated_at: self.updated_at,
        })
    }
}
