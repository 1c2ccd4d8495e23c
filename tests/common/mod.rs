#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use pix_payments::adapters::{
    InMemoryPaymentRepository, InMemoryQueue, InMemoryWorkflowStore, PayloadQrRenderer,
};
use pix_payments::domain::{Cart, CartItem, FixedClock, ProviderName, SessionId};
use pix_payments::ports::{
    CartGateway, CreatePaymentGateway, CreatePaymentRequest, GatewayError, GatewayResult,
    ProviderPayment, QrCodeRenderer,
};
use pix_payments::startup::{Adapters, Services, Settings};
use pix_payments::workflow::{RetryPolicy, WorkflowWorker};

/// Cart service double: every session holds the same items.
pub struct StubCart {
    items: Mutex<Vec<CartItem>>,
}

impl StubCart {
    pub fn with_total(total: i64) -> Self {
        Self {
            items: Mutex::new(vec![CartItem {
                sku: "SKU-1".to_string(),
                quantity: 1,
                unit_price: BigDecimal::from(total),
                title: Some("Combo".to_string()),
            }]),
        }
    }

    pub async fn empty(&self) {
        self.items.lock().await.clear();
    }
}

#[async_trait]
impl CartGateway for StubCart {
    async fn get_cart(&self, _session_id: &SessionId) -> GatewayResult<Cart> {
        Ok(Cart {
            items: self.items.lock().await.clone(),
        })
    }
}

/// Provider double that hands out sequential external ids.
#[derive(Default)]
pub struct StubProvider {
    calls: AtomicU32,
    failing: AtomicBool,
    pub requests: Mutex<Vec<CreatePaymentRequest>>,
}

impl StubProvider {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CreatePaymentGateway for StubProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::MercadoPago
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> GatewayResult<ProviderPayment> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 500,
                message: "provider down".to_string(),
            });
        }
        self.requests.lock().await.push(request.clone());
        Ok(ProviderPayment {
            qr_code: format!("pix-payload-{}", n),
            external_payment_id: format!("mp-{}", n),
        })
    }
}

/// Renderer double that always fails, counting its calls.
#[derive(Default)]
pub struct FailingRenderer {
    calls: AtomicU32,
}

impl FailingRenderer {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QrCodeRenderer for FailingRenderer {
    async fn render(&self, _payload: &str) -> GatewayResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::InvalidResponse("qr encoder unavailable".to_string()))
    }
}

pub struct TestContext {
    pub services: Services,
    pub repository: Arc<InMemoryPaymentRepository>,
    pub workflows: Arc<InMemoryWorkflowStore>,
    pub queue: Arc<InMemoryQueue>,
    pub clock: Arc<FixedClock>,
    pub cart: Arc<StubCart>,
    pub provider: Arc<StubProvider>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::build(settings, Arc::new(PayloadQrRenderer))
    }

    pub fn with_qr_renderer(qr_renderer: Arc<dyn QrCodeRenderer>) -> Self {
        Self::build(Settings::default(), qr_renderer)
    }

    fn build(settings: Settings, qr_renderer: Arc<dyn QrCodeRenderer>) -> Self {
        let repository = Arc::new(InMemoryPaymentRepository::new());
        let workflows = Arc::new(InMemoryWorkflowStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        ));
        let cart = Arc::new(StubCart::with_total(100));
        let provider = Arc::new(StubProvider::default());

        let services = Services::build(
            Adapters {
                repository: repository.clone(),
                workflow_store: workflows.clone(),
                queue: queue.clone(),
                publisher: queue.clone(),
                cart_gateway: cart.clone(),
                payment_gateway: provider.clone(),
                qr_renderer,
                clock: clock.clone(),
            },
            settings,
        );

        Self {
            services,
            repository,
            workflows,
            queue,
            clock,
            cart,
            provider,
        }
    }

    /// Worker with instant retries so exhausted activities do not slow tests down.
    pub fn worker(&self) -> WorkflowWorker {
        self.services.workflow_worker().with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        })
    }
}
