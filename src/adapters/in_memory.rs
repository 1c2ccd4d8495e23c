//! In-process adapters. Used by the test suites and for running the service
//! without Postgres or Redis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

use crate::domain::{IdempotencyKey, Payment, PersistedPayment};
use crate::ports::{
    MessageQueue, PaymentRepository, QueueError, QueuePublisher, QueueResult, RepositoryError,
    RepositoryResult, WorkflowStore,
};
use crate::workflow::{WorkflowInstance, WorkflowOutcome, WorkflowSignal, WorkflowStatus};

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<Uuid, PersistedPayment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }

    fn load(state: &PersistedPayment) -> RepositoryResult<Payment> {
        Payment::from_persistence(state.clone())
            .map_err(|e| RepositoryError::Corrupt(format!("payment {}: {}", state.id, e)))
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn save(&self, payment: &Payment) -> RepositoryResult<()> {
        let mut payments = self.payments.write().await;
        let key = payment.idempotency_key();
        if payments.values().any(|p| p.idempotency_key == key) {
            return Err(RepositoryError::Duplicate(key.to_string()));
        }
        if payments.contains_key(&payment.id()) {
            return Err(RepositoryError::Duplicate(payment.id().to_string()));
        }
        payments.insert(payment.id(), payment.to_persistence());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        self.payments
            .read()
            .await
            .get(&id)
            .map(Self::load)
            .transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> RepositoryResult<Option<Payment>> {
        self.payments
            .read()
            .await
            .values()
            .find(|p| p.idempotency_key == *key)
            .map(Self::load)
            .transpose()
    }

    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Payment>> {
        self.payments
            .read()
            .await
            .values()
            .find(|p| {
                p.provider
                    .as_ref()
                    .is_some_and(|r| r.external_payment_id() == external_payment_id)
            })
            .map(Self::load)
            .transpose()
    }

    async fn update(&self, payment: &Payment) -> RepositoryResult<()> {
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(&payment.id())
            .ok_or_else(|| RepositoryError::NotFound(payment.id().to_string()))?;

        if stored.version != payment.version() {
            return Err(RepositoryError::Conflict {
                id: payment.id().to_string(),
                expected: payment.version(),
            });
        }

        let mut next = payment.to_persistence();
        next.version = stored.version + 1;
        *stored = next;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    instances: Mutex<HashMap<String, WorkflowInstance>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<WorkflowInstance> {
        self.instances.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, instance: &WorkflowInstance) -> RepositoryResult<bool> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&instance.workflow_id) {
            return Ok(false);
        }
        instances.insert(instance.workflow_id.clone(), instance.clone());
        Ok(true)
    }

    async fn get(&self, workflow_id: &str) -> RepositoryResult<Option<WorkflowInstance>> {
        Ok(self.instances.lock().await.get(workflow_id).cloned())
    }

    async fn record_signal(
        &self,
        workflow_id: &str,
        signal: &WorkflowSignal,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut instances = self.instances.lock().await;
        match instances.get_mut(workflow_id) {
            Some(instance)
                if instance.status == WorkflowStatus::Running && instance.signal.is_none() =>
            {
                instance.signal = Some(signal.clone());
                instance.signaled_at = Some(at);
                instance.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowInstance>> {
        let mut instances = self.instances.lock().await;
        let mut ready: Vec<&mut WorkflowInstance> = instances
            .values_mut()
            .filter(|instance| instance.is_ready(now))
            .collect();
        ready.sort_by_key(|instance| instance.deadline);

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(ready
            .into_iter()
            .take(limit)
            .map(|instance| {
                instance.status = WorkflowStatus::Executing;
                instance.lease_until = Some(lease_until);
                instance.updated_at = now;
                instance.clone()
            })
            .collect())
    }

    async fn complete(
        &self,
        workflow_id: &str,
        outcome: WorkflowOutcome,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut instances = self.instances.lock().await;
        let instance = instances
            .get_mut(workflow_id)
            .ok_or_else(|| RepositoryError::NotFound(workflow_id.to_string()))?;
        instance.status = WorkflowStatus::Completed;
        instance.outcome = Some(outcome);
        instance.lease_until = None;
        instance.updated_at = at;
        Ok(())
    }

    async fn fail(&self, workflow_id: &str, error: &str, at: DateTime<Utc>) -> RepositoryResult<()> {
        let mut instances = self.instances.lock().await;
        let instance = instances
            .get_mut(workflow_id)
            .ok_or_else(|| RepositoryError::NotFound(workflow_id.to_string()))?;
        instance.status = WorkflowStatus::Failed;
        instance.error = Some(error.to_string());
        instance.lease_until = None;
        instance.updated_at = at;
        Ok(())
    }
}

/// FIFO queues keyed by name, holding raw JSON strings.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    arrived: Notify,
    unavailable: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail, to exercise broker outages.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn push_raw(&self, queue: &str, raw: impl Into<String>) {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(raw.into());
        self.arrived.notify_waiters();
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    /// Parsed copies of everything still queued, oldest first.
    pub async fn messages(&self, queue: &str) -> Vec<serde_json::Value> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|raw| serde_json::from_str(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn pop(&self, queue: &str) -> Option<String> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl QueuePublisher for InMemoryQueue {
    async fn publish(&self, queue: &str, message: &serde_json::Value) -> QueueResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "queue unavailable",
            ))));
        }
        let raw = serde_json::to_string(message)?;
        self.push_raw(queue, raw).await;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<String>> {
        if let Some(raw) = self.pop(queue).await {
            return Ok(Some(raw));
        }
        let _ = tokio::time::timeout(wait, self.arrived.notified()).await;
        Ok(self.pop(queue).await)
    }
}
