mod common;

use chrono::Duration;
use serde_json::json;

use common::TestContext;
use pix_payments::domain::{IdempotencyKey, PaymentStatus, SessionId};
use pix_payments::ports::PaymentRepository;
use pix_payments::services::consumer::MessageHandler;
use pix_payments::startup::Settings;
use pix_payments::use_cases::notify_payment::PAYMENT_PAID_QUEUE;
use pix_payments::use_cases::{CreatePaymentInput, CreatePaymentOutput, PaymentReference};
use pix_payments::workflow::orchestrator::workflow_id_for;
use pix_payments::workflow::{
    SignalDelivery, WorkflowOutcome, WorkflowResult, WorkflowSignal, WorkflowStatus,
};

async fn create(ctx: &TestContext) -> (CreatePaymentOutput, IdempotencyKey) {
    let key = IdempotencyKey::generate();
    let output = ctx
        .services
        .create_payment
        .execute(CreatePaymentInput {
            session_id: SessionId::generate(),
            idempotency_key: key,
        })
        .await
        .unwrap();
    (output, key)
}

async fn status(ctx: &TestContext, output: &CreatePaymentOutput) -> PaymentStatus {
    ctx.repository
        .find_by_id(output.payment_id)
        .await
        .unwrap()
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_create_starts_one_workflow_per_key() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    let instance = ctx
        .services
        .orchestrator
        .describe(&workflow_id_for(&key))
        .await
        .unwrap();
    assert_eq!(instance.payment_id, output.payment_id);
    assert_eq!(instance.status, WorkflowStatus::Running);
    assert_eq!(instance.deadline, instance.started_at + Duration::minutes(30));
}

#[tokio::test]
async fn test_nothing_runs_before_signal_or_deadline() {
    let ctx = TestContext::new();
    let (output, _) = create(&ctx).await;

    ctx.clock.advance(Duration::minutes(29));
    assert_eq!(ctx.worker().tick().await.unwrap(), 0);
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_timeout_cancels_and_reports_expired() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    ctx.clock.advance(Duration::minutes(31));
    assert_eq!(ctx.worker().tick().await.unwrap(), 1);

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Canceled);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id_for(&key)).await.unwrap(),
        WorkflowResult::Completed(WorkflowOutcome::Expired)
    );

    // Terminal: a second pass finds nothing to do.
    assert_eq!(ctx.worker().tick().await.unwrap(), 0);
}

#[tokio::test]
async fn test_confirmed_signal_pays_and_notifies() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    let delivery = ctx
        .services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::Confirmed)
        .await
        .unwrap();
    assert_eq!(delivery, SignalDelivery::Accepted);

    ctx.worker().tick().await.unwrap();

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Paid);
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id_for(&key)).await.unwrap(),
        WorkflowResult::Completed(WorkflowOutcome::Paid)
    );
}

#[tokio::test]
async fn test_failed_signal_cancels() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    ctx.services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::failed(Some("order.canceled")))
        .await
        .unwrap();
    ctx.worker().tick().await.unwrap();

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Canceled);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id_for(&key)).await.unwrap(),
        WorkflowResult::Completed(WorkflowOutcome::Cancelled)
    );
}

#[tokio::test]
async fn test_first_signal_wins() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;
    let orchestrator = &ctx.services.orchestrator;

    assert_eq!(
        orchestrator.signal_for_key(&key, WorkflowSignal::Confirmed).await.unwrap(),
        SignalDelivery::Accepted
    );
    assert_eq!(
        orchestrator
            .signal_for_key(&key, WorkflowSignal::failed(None))
            .await
            .unwrap(),
        SignalDelivery::Superseded
    );

    ctx.worker().tick().await.unwrap();
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Paid);

    assert_eq!(
        orchestrator.signal_for_key(&key, WorkflowSignal::failed(None)).await.unwrap(),
        SignalDelivery::Finished
    );
}

#[tokio::test]
async fn test_signal_beats_elapsed_deadline() {
    let ctx = TestContext::with_settings(Settings {
        workflow_timeout_minutes: 2,
        ..Settings::default()
    });
    let (output, key) = create(&ctx).await;

    ctx.services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::Confirmed)
        .await
        .unwrap();
    // The worker only catches up after the workflow deadline; the payment
    // itself is still inside its expiration window.
    ctx.clock.advance(Duration::minutes(5));
    ctx.worker().tick().await.unwrap();

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_workflow_fails_when_payment_expired_before_confirmation() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;
    ctx.clock.advance(Duration::minutes(11));

    ctx.services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::Confirmed)
        .await
        .unwrap();
    ctx.worker().tick().await.unwrap();

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Pending);
    assert!(matches!(
        ctx.services.orchestrator.result(&workflow_id_for(&key)).await.unwrap(),
        WorkflowResult::Failed(_)
    ));
}

#[tokio::test]
async fn test_paid_directly_is_notified_once() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    ctx.services
        .mark_as_paid
        .execute(&PaymentReference::Id(output.payment_id))
        .await
        .unwrap();
    ctx.services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::Confirmed)
        .await
        .unwrap();
    ctx.worker().tick().await.unwrap();

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Paid);
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id_for(&key)).await.unwrap(),
        WorkflowResult::Completed(WorkflowOutcome::Paid)
    );

    ctx.services
        .notify_paid
        .execute(&PaymentReference::Id(output.payment_id))
        .await
        .unwrap();
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
}

#[tokio::test]
async fn test_queue_outage_defers_notification_until_lease_lapses() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;
    let workflow_id = workflow_id_for(&key);

    ctx.queue.set_unavailable(true);
    ctx.services
        .orchestrator
        .signal_for_key(&key, WorkflowSignal::Confirmed)
        .await
        .unwrap();
    assert_eq!(ctx.worker().tick().await.unwrap(), 1);

    assert_eq!(status(&ctx, &output).await, PaymentStatus::Paid);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id).await.unwrap(),
        WorkflowResult::Pending
    );

    ctx.queue.set_unavailable(false);
    assert_eq!(ctx.worker().tick().await.unwrap(), 0);

    ctx.clock.advance(Duration::minutes(2));
    assert_eq!(ctx.worker().tick().await.unwrap(), 1);

    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
    assert_eq!(
        ctx.services.orchestrator.result(&workflow_id).await.unwrap(),
        WorkflowResult::Completed(WorkflowOutcome::Paid)
    );
    let stored = ctx
        .repository
        .find_by_id(output.payment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.notified_at().is_some());
}

#[tokio::test]
async fn test_canceled_webhook_goes_through_workflow() {
    let ctx = TestContext::new();
    let (output, key) = create(&ctx).await;

    ctx.services
        .process_handler()
        .handle(&json!({
            "paymentReference": output.payment_id.to_string(),
            "webhookPayload": { "action": "order.canceled" },
        }))
        .await
        .unwrap();

    // Signalled, not yet applied.
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Pending);
    let instance = ctx
        .services
        .orchestrator
        .describe(&workflow_id_for(&key))
        .await
        .unwrap();
    assert_eq!(instance.signal, Some(WorkflowSignal::failed(Some("order.canceled"))));

    ctx.worker().tick().await.unwrap();
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Canceled);
}

#[tokio::test]
async fn test_action_after_workflow_finished_runs_directly() {
    let ctx = TestContext::new();
    let (output, _) = create(&ctx).await;

    ctx.clock.advance(Duration::minutes(31));
    ctx.worker().tick().await.unwrap();
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Canceled);

    ctx.services
        .process_handler()
        .handle(&json!({
            "paymentReference": output.payment_id.to_string(),
            "webhookPayload": { "action": "order.refunded" },
        }))
        .await
        .unwrap();
    assert_eq!(status(&ctx, &output).await, PaymentStatus::Refunded);
}
