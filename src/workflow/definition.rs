use chrono::{DateTime, Utc};

use super::{WorkflowInstance, WorkflowOutcome, WorkflowSignal};

pub const EXPIRED_REASON: &str = "expired";
pub const DEFAULT_FAILURE_REASON: &str = "payment failed";

/// What the workflow does next. Pure; the worker performs the side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStep {
    Wait,
    MarkPaid,
    Cancel {
        reason: String,
        outcome: WorkflowOutcome,
    },
}

/// A signal always beats the deadline; the deadline only counts when no signal arrived.
pub fn next_step(instance: &WorkflowInstance, now: DateTime<Utc>) -> WorkflowStep {
    if instance.status.is_terminal() {
        return WorkflowStep::Wait;
    }

    match &instance.signal {
        Some(WorkflowSignal::Confirmed) => WorkflowStep::MarkPaid,
        Some(WorkflowSignal::Failed { reason }) => WorkflowStep::Cancel {
            reason: reason.clone(),
            outcome: WorkflowOutcome::Cancelled,
        },
        None if now >= instance.deadline => WorkflowStep::Cancel {
            reason: EXPIRED_REASON.to_string(),
            outcome: WorkflowOutcome::Expired,
        },
        None => WorkflowStep::Wait,
    }
}
