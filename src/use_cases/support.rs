use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use tracing::warn;

use super::error::UseCaseError;
use super::reference::PaymentReference;
use crate::domain::{Clock, EventSource, Payment, PaymentResult};
use crate::events::EventDispatcher;
use crate::ports::{PaymentRepository, RepositoryError};

pub(crate) async fn load_payment(
    repository: &dyn PaymentRepository,
    reference: &PaymentReference,
) -> Result<Payment, UseCaseError> {
    let found = match reference {
        PaymentReference::Id(id) => repository.find_by_id(*id).await?,
        PaymentReference::External(external) => {
            repository.find_by_external_payment_id(external).await?
        }
    };

    found.ok_or_else(|| UseCaseError::PaymentNotFound(reference.to_string()))
}

/// Load, transition, write back, dispatch. A stale write is retried once on a
/// fresh copy; a second conflict surfaces as a persistence error.
pub(crate) async fn apply_transition<F>(
    repository: &dyn PaymentRepository,
    dispatcher: &EventDispatcher,
    clock: &dyn Clock,
    reference: &PaymentReference,
    transition: F,
) -> Result<(Payment, DateTime<Utc>), UseCaseError>
where
    F: Fn(&mut Payment, DateTime<Utc>) -> PaymentResult<()>,
{
    let mut retried = false;
    loop {
        let mut payment = load_payment(repository, reference).await?;
        let now = clock.now();
        transition(&mut payment, now)?;

        match repository.update(&payment).await {
            Ok(()) => {
                dispatcher.dispatch_all(payment.take_events()).await;
                return Ok((payment, now));
            }
            Err(RepositoryError::Conflict { id, expected }) if !retried => {
                warn!(
                    payment_id = %id,
                    expected_version = expected,
                    "Concurrent update detected, reloading payment"
                );
                retried = true;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Runs every write to completion before looking at the results, so nothing is
/// still in flight when the caller decides to roll back. Returns the first error.
pub async fn execute_all_or_fail<T, E, Fut>(operations: Vec<Fut>) -> Result<Vec<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    join_all(operations).await.into_iter().collect()
}
