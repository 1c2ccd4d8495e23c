//! Create payment use case.
//! Prices the cart, opens the PIX charge at the provider, attaches the QR code
//! and only then persists. Nothing is saved unless every step succeeded.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::UseCaseError;
use crate::domain::{
    Clock, EventSource, ExpirationPolicy, IdempotencyKey, NewPayment, Payment,
    PaymentAmountCalculator, PaymentProviderRef, PaymentType, SessionId,
};
use crate::events::EventDispatcher;
use crate::ports::{
    CartGateway, CreatePaymentGateway, CreatePaymentRequest, PaymentRepository, QrCodeRenderer,
    RepositoryError,
};
use crate::workflow::{StartPaymentWorkflow, WorkflowOrchestrator};

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub session_id: SessionId,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentOutput {
    pub payment_id: Uuid,
    pub image: String,
    pub expires_at: DateTime<Utc>,
}

pub struct CreatePayment {
    repository: Arc<dyn PaymentRepository>,
    cart_gateway: Arc<dyn CartGateway>,
    payment_gateway: Arc<dyn CreatePaymentGateway>,
    qr_renderer: Arc<dyn QrCodeRenderer>,
    dispatcher: Arc<EventDispatcher>,
    clock: Arc<dyn Clock>,
    expiration: ExpirationPolicy,
    calculator: PaymentAmountCalculator,
    workflows: Option<Arc<WorkflowOrchestrator>>,
}

impl CreatePayment {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        cart_gateway: Arc<dyn CartGateway>,
        payment_gateway: Arc<dyn CreatePaymentGateway>,
        qr_renderer: Arc<dyn QrCodeRenderer>,
        dispatcher: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            cart_gateway,
            payment_gateway,
            qr_renderer,
            dispatcher,
            clock,
            expiration: ExpirationPolicy::default(),
            calculator: PaymentAmountCalculator,
            workflows: None,
        }
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }

    /// Starts (or rejoins) the confirmation workflow for every payment handled here.
    pub fn with_workflows(mut self, workflows: Arc<WorkflowOrchestrator>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    pub async fn execute(
        &self,
        input: CreatePaymentInput,
    ) -> Result<CreatePaymentOutput, UseCaseError> {
        if let Some(existing) = self
            .repository
            .find_by_idempotency_key(&input.idempotency_key)
            .await?
        {
            warn!(
                payment_id = %existing.id(),
                idempotency_key = %input.idempotency_key,
                "Payment already exists for idempotency key"
            );
            self.start_workflow(&existing).await?;
            return Err(UseCaseError::PaymentAlreadyExists(input.idempotency_key));
        }

        let cart = self.cart_gateway.get_cart(&input.session_id).await?;
        if cart.is_empty() {
            return Err(UseCaseError::EmptyCart(input.session_id));
        }
        let amount = self.calculator.total(&cart.items);

        let mut payment = Payment::create(
            NewPayment {
                amount,
                payment_type: PaymentType::Pix,
                idempotency_key: input.idempotency_key,
                session_id: input.session_id,
            },
            self.clock.as_ref(),
            &self.expiration,
        )?;

        let provider_payment = self
            .payment_gateway
            .create_payment(&CreatePaymentRequest {
                amount: payment.amount().clone(),
                items: cart.items,
                idempotency_key: input.idempotency_key,
                expiration: payment.expires_at(),
                external_reference: payment.id().to_string(),
            })
            .await?;

        payment.add_payment_provider(PaymentProviderRef::new(
            self.payment_gateway.provider(),
            provider_payment.external_payment_id,
        )?);

        let image = self.qr_renderer.render(&provider_payment.qr_code).await?;
        payment.add_payment_detail(image.clone())?;

        self.repository.save(&payment).await.map_err(|e| match e {
            RepositoryError::Duplicate(_) => {
                UseCaseError::PaymentAlreadyExists(input.idempotency_key)
            }
            other => UseCaseError::Persistence(other),
        })?;

        self.dispatcher.dispatch_all(payment.take_events()).await;

        info!(
            payment_id = %payment.id(),
            amount = %payment.amount(),
            expires_at = %payment.expires_at(),
            "Payment created"
        );

        self.start_workflow(&payment).await?;

        Ok(CreatePaymentOutput {
            payment_id: payment.id(),
            image,
            expires_at: payment.expires_at(),
        })
    }

    async fn start_workflow(&self, payment: &Payment) -> Result<(), UseCaseError> {
        let Some(workflows) = &self.workflows else {
            return Ok(());
        };

        workflows
            .start(StartPaymentWorkflow {
                payment_id: payment.id(),
                idempotency_key: payment.idempotency_key(),
                timeout_minutes: None,
            })
            .await?;
        Ok(())
    }
}
