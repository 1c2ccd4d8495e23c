//! Durable payment confirmation workflow.
//!
//! Each payment gets one instance, keyed `payment-{idempotency_key}`, stored
//! through `WorkflowStore`. The instance waits for a `confirmed` or `failed`
//! signal until its deadline; `WorkflowWorker` polls the store, leases ready
//! instances and runs the matching activities exactly once per outcome.

pub mod activities;
pub mod definition;
pub mod orchestrator;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::ports::RepositoryError;

pub use activities::{ActivityError, PaymentActivities, RetryPolicy, UseCaseActivities};
pub use definition::{next_step, WorkflowStep, DEFAULT_FAILURE_REASON, EXPIRED_REASON};
pub use orchestrator::{
    SignalDelivery, StartPaymentWorkflow, WorkflowHandle, WorkflowOrchestrator, WorkflowResult,
    DEFAULT_TIMEOUT_MINUTES,
};
pub use worker::{run_workflow_worker, WorkflowWorker};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("workflow store error: {0}")]
    Store(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Executing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(RepositoryError::Corrupt(format!(
                "unknown workflow status {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum WorkflowSignal {
    Confirmed,
    Failed { reason: String },
}

impl WorkflowSignal {
    pub const CONFIRMED: &'static str = "confirmed";
    pub const FAILED: &'static str = "failed";

    /// A blank or missing reason falls back to `DEFAULT_FAILURE_REASON`.
    pub fn failed(reason: Option<&str>) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_FAILURE_REASON);
        Self::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Confirmed => Self::CONFIRMED,
            Self::Failed { .. } => Self::FAILED,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Confirmed => None,
            Self::Failed { reason } => Some(reason),
        }
    }

    /// Rebuilds a signal from its stored name and reason columns.
    pub fn from_parts(name: &str, reason: Option<&str>) -> Result<Self, RepositoryError> {
        match name {
            Self::CONFIRMED => Ok(Self::Confirmed),
            Self::FAILED => Ok(Self::failed(reason)),
            other => Err(RepositoryError::Corrupt(format!(
                "unknown workflow signal {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Paid,
    Cancelled,
    Expired,
}

impl WorkflowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowOutcome {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(RepositoryError::Corrupt(format!(
                "unknown workflow outcome {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowInstance {
    pub workflow_id: String,
    pub payment_id: Uuid,
    pub status: WorkflowStatus,
    pub signal: Option<WorkflowSignal>,
    pub signaled_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub lease_until: Option<DateTime<Utc>>,
    pub outcome: Option<WorkflowOutcome>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(
        workflow_id: String,
        payment_id: Uuid,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id,
            payment_id,
            status: WorkflowStatus::Running,
            signal: None,
            signaled_at: None,
            started_at,
            deadline,
            lease_until: None,
            outcome: None,
            error: None,
            updated_at: started_at,
        }
    }

    /// True when the worker has something to do for this instance at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            WorkflowStatus::Running => self.signal.is_some() || now >= self.deadline,
            WorkflowStatus::Executing => self.lease_until.map_or(true, |lease| lease <= now),
            WorkflowStatus::Completed | WorkflowStatus::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_failed_signal_defaults_reason() {
        assert_eq!(
            WorkflowSignal::failed(None).reason(),
            Some(DEFAULT_FAILURE_REASON)
        );
        assert_eq!(
            WorkflowSignal::failed(Some("  ")).reason(),
            Some(DEFAULT_FAILURE_REASON)
        );
        assert_eq!(
            WorkflowSignal::failed(Some("card declined")).reason(),
            Some("card declined")
        );
    }

    #[test]
    fn test_signal_round_trips_through_parts() {
        let signal = WorkflowSignal::failed(Some("rejected by bank"));
        let restored = WorkflowSignal::from_parts(signal.name(), signal.reason()).unwrap();
        assert_eq!(restored, signal);
        assert!(WorkflowSignal::from_parts("paused", None).is_err());
    }

    #[test]
    fn test_readiness() {
        let now = Utc::now();
        let mut instance =
            WorkflowInstance::new("payment-x".into(), Uuid::new_v4(), now, now + Duration::minutes(30));
        assert!(!instance.is_ready(now));

        instance.signal = Some(WorkflowSignal::Confirmed);
        assert!(instance.is_ready(now));

        instance.signal = None;
        assert!(instance.is_ready(now + Duration::minutes(30)));

        instance.status = WorkflowStatus::Executing;
        instance.lease_until = Some(now + Duration::minutes(1));
        assert!(!instance.is_ready(now));
        assert!(instance.is_ready(now + Duration::minutes(2)));

        instance.status = WorkflowStatus::Completed;
        assert!(!instance.is_ready(now + Duration::hours(1)));
    }
}
