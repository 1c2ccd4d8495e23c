mod common;

use bigdecimal::BigDecimal;
use chrono::Duration;
use serde_json::json;

use common::{FailingRenderer, TestContext};
use std::sync::Arc;
use pix_payments::domain::{Clock, IdempotencyKey, PaymentError, PaymentStatus, SessionId};
use pix_payments::ports::PaymentRepository;
use pix_payments::services::consumer::{decide, ConsumerError, Disposition, MessageHandler};
use pix_payments::use_cases::notify_payment::PAYMENT_PAID_QUEUE;
use pix_payments::use_cases::{
    CreatePaymentInput, CreatePaymentOutput, PaymentReference, UseCaseError,
};

async fn create(ctx: &TestContext, key: IdempotencyKey) -> Result<CreatePaymentOutput, UseCaseError> {
    ctx.services
        .create_payment
        .execute(CreatePaymentInput {
            session_id: SessionId::generate(),
            idempotency_key: key,
        })
        .await
}

async fn external_id(ctx: &TestContext, output: &CreatePaymentOutput) -> String {
    ctx.repository
        .find_by_id(output.payment_id)
        .await
        .unwrap()
        .unwrap()
        .provider()
        .unwrap()
        .external_payment_id()
        .to_string()
}

fn webhook(reference: &str, action: &str) -> serde_json::Value {
    json!({
        "paymentReference": reference,
        "webhookPayload": { "action": action, "data": { "id": reference } },
    })
}

#[tokio::test]
async fn test_create_payment_is_pending_with_expiration() {
    let ctx = TestContext::new();
    let now = pix_payments::domain::Clock::now(ctx.clock.as_ref());

    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();

    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
    assert_eq!(payment.amount(), &BigDecimal::from(100));
    assert_eq!(payment.expires_at(), now + Duration::minutes(10));
    assert_eq!(output.expires_at, payment.expires_at());
    assert!(output.image.starts_with("data:text/plain;base64,"));
    assert_eq!(payment.detail().unwrap().qr_code(), output.image);
    assert_eq!(ctx.provider.calls(), 1);
    assert_eq!(ctx.workflows.all().await.len(), 1);
}

#[tokio::test]
async fn test_provider_receives_payment_id_as_external_reference() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();

    let requests = ctx.provider.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].external_reference, output.payment_id.to_string());
    assert_eq!(requests[0].amount, BigDecimal::from(100));
}

#[tokio::test]
async fn test_duplicate_idempotency_key_has_no_side_effects() {
    let ctx = TestContext::new();
    let key = IdempotencyKey::generate();

    create(&ctx, key).await.unwrap();
    let err = create(&ctx, key).await.unwrap_err();

    assert!(matches!(err, UseCaseError::PaymentAlreadyExists(k) if k == key));
    assert_eq!(ctx.provider.calls(), 1);
    assert_eq!(ctx.repository.len().await, 1);
    assert_eq!(ctx.workflows.all().await.len(), 1);
}

#[tokio::test]
async fn test_empty_cart_is_rejected_before_the_provider() {
    let ctx = TestContext::new();
    ctx.cart.empty().await;

    let err = create(&ctx, IdempotencyKey::generate()).await.unwrap_err();

    assert!(matches!(err, UseCaseError::EmptyCart(_)));
    assert!(err.is_business());
    assert_eq!(ctx.provider.calls(), 0);
    assert!(ctx.repository.is_empty().await);
}

#[tokio::test]
async fn test_provider_failure_persists_nothing() {
    let ctx = TestContext::new();
    ctx.provider.set_failing(true);

    let err = create(&ctx, IdempotencyKey::generate()).await.unwrap_err();

    assert!(matches!(err, UseCaseError::Gateway(_)));
    assert!(!err.is_business());
    assert!(ctx.repository.is_empty().await);
    assert!(ctx.workflows.all().await.is_empty());
}

#[tokio::test]
async fn test_qr_render_failure_persists_nothing() {
    let renderer = Arc::new(FailingRenderer::default());
    let ctx = TestContext::with_qr_renderer(renderer.clone());

    let err = create(&ctx, IdempotencyKey::generate()).await.unwrap_err();

    assert!(matches!(err, UseCaseError::Gateway(_)));
    assert!(!err.is_business());
    assert_eq!(ctx.provider.calls(), 1);
    assert_eq!(renderer.calls(), 1);
    assert!(ctx.repository.is_empty().await);
    assert!(ctx.workflows.all().await.is_empty());
}

#[tokio::test]
async fn test_processed_webhook_pays_once_and_resend_is_already_paid() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = external_id(&ctx, &output).await;
    let handler = ctx.services.process_handler();

    handler.handle(&webhook(&reference, "order.processed")).await.unwrap();
    assert_eq!(ctx.worker().tick().await.unwrap(), 1);

    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Paid);
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);

    let resend = handler.handle(&webhook(&reference, "order.processed")).await;
    assert!(matches!(
        resend,
        Err(ConsumerError::UseCase(UseCaseError::Payment(PaymentError::AlreadyPaid)))
    ));
    assert_eq!(decide(&resend, 0, 5), Disposition::Ack);

    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Paid);
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
}

#[tokio::test]
async fn test_paid_notification_survives_queue_outage() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = PaymentReference::Id(output.payment_id);
    let process = &ctx.services.process_payment;

    ctx.queue.set_unavailable(true);
    let first = process.execute(&reference, "order.processed").await;
    assert!(matches!(first, Err(UseCaseError::Queue(_))));
    let first = first.map(|_| ()).map_err(ConsumerError::UseCase);
    assert_eq!(decide(&first, 0, 5), Disposition::Retry);

    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Paid);
    assert!(payment.notified_at().is_none());
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 0);

    ctx.queue.set_unavailable(false);
    let redelivery = process.execute(&reference, "order.processed").await;
    assert!(matches!(
        redelivery,
        Err(UseCaseError::Payment(PaymentError::AlreadyPaid))
    ));
    let redelivery = redelivery.map(|_| ()).map_err(ConsumerError::UseCase);
    assert_eq!(decide(&redelivery, 1, 5), Disposition::Ack);
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);

    let messages = ctx.queue.messages(PAYMENT_PAID_QUEUE).await;
    assert_eq!(messages[0]["paymentId"], json!(output.payment_id.to_string()));

    // Once delivered, later resends stay quiet.
    let _ = process.execute(&reference, "order.processed").await;
    assert_eq!(ctx.queue.len(PAYMENT_PAID_QUEUE).await, 1);
    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.notified_at(), Some(ctx.clock.now()));
    assert_eq!(payment.paid_at(), Some(ctx.clock.now()));
}

#[tokio::test]
async fn test_paid_notification_carries_payment_details() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = external_id(&ctx, &output).await;

    ctx.services
        .process_handler()
        .handle(&webhook(&reference, "order.processed"))
        .await
        .unwrap();
    ctx.worker().tick().await.unwrap();

    let messages = ctx.queue.messages(PAYMENT_PAID_QUEUE).await;
    assert_eq!(messages[0]["paymentId"], json!(output.payment_id.to_string()));
    assert_eq!(messages[0]["externalPaymentId"], json!(reference));
    assert!(messages[0]["paidAt"].is_string());
}

#[tokio::test]
async fn test_refunded_webhook_applies_directly() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = external_id(&ctx, &output).await;

    ctx.services
        .process_handler()
        .handle(&webhook(&reference, "order.refunded"))
        .await
        .unwrap();

    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Refunded);
    assert!(payment.refunded_at().is_some());
    // No workflow step was needed.
    assert_eq!(ctx.worker().tick().await.unwrap(), 0);
}

#[tokio::test]
async fn test_refund_twice_is_already_refunded() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = PaymentReference::Id(output.payment_id);

    ctx.services.refund_payment.execute(&reference).await.unwrap();
    let err = ctx.services.refund_payment.execute(&reference).await.unwrap_err();

    assert!(matches!(err, UseCaseError::Payment(PaymentError::AlreadyRefunded)));
}

#[tokio::test]
async fn test_expired_payment_cannot_be_paid() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    ctx.clock.advance(Duration::minutes(11));

    let err = ctx
        .services
        .mark_as_paid
        .execute(&PaymentReference::Id(output.payment_id))
        .await
        .unwrap_err();

    assert!(matches!(err, UseCaseError::Payment(PaymentError::Expired { .. })));
    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn test_unknown_reference_is_business_failure() {
    let ctx = TestContext::new();

    let result = ctx
        .services
        .process_handler()
        .handle(&webhook("mp-unknown", "order.processed"))
        .await;

    assert!(matches!(
        result,
        Err(ConsumerError::UseCase(UseCaseError::PaymentNotFound(_)))
    ));
    assert_eq!(decide(&result, 0, 5), Disposition::Ack);
}

#[tokio::test]
async fn test_unsupported_action_cannot_be_processed() {
    let ctx = TestContext::new();
    let output = create(&ctx, IdempotencyKey::generate()).await.unwrap();
    let reference = external_id(&ctx, &output).await;

    let result = ctx
        .services
        .process_handler()
        .handle(&webhook(&reference, "order.created"))
        .await;

    assert!(matches!(
        result,
        Err(ConsumerError::UseCase(UseCaseError::CannotProcess(_)))
    ));
    let payment = ctx.repository.find_by_id(output.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
}
