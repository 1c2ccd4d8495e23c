use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{
    HttpCartGateway, HttpQrRenderer, MercadoPagoClient, PayloadQrRenderer,
    PostgresPaymentRepository, PostgresWorkflowStore, RedisQueue,
};
use crate::config::Config;
use crate::domain::{Clock, ExpirationPolicy, SystemClock};
use crate::events::{EventDispatcher, LoggingEventHandler, ALL_EVENTS};
use crate::health::{HealthChecks, MercadoPagoChecker, PostgresChecker, RedisChecker};
use crate::ports::{
    CartGateway, CreatePaymentGateway, MessageQueue, PaymentRepository, QrCodeRenderer,
    QueuePublisher, WorkflowStore,
};
use crate::services::consumer::{
    CreatePaymentHandler, ProcessPaymentHandler, QueueConsumer, CREATE_PAYMENT_QUEUE,
    PROCESS_PAYMENT_QUEUE,
};
use crate::use_cases::{
    CancelPayment, CreatePayment, MarkAsPaid, NotifyPaymentPaid, ProcessPayment, RefundPayment,
};
use crate::workflow::{RetryPolicy, UseCaseActivities, WorkflowOrchestrator, WorkflowWorker};

/// Concrete implementations of every port the services need.
pub struct Adapters {
    pub repository: Arc<dyn PaymentRepository>,
    pub workflow_store: Arc<dyn WorkflowStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub publisher: Arc<dyn QueuePublisher>,
    pub cart_gateway: Arc<dyn CartGateway>,
    pub payment_gateway: Arc<dyn CreatePaymentGateway>,
    pub qr_renderer: Arc<dyn QrCodeRenderer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub payment_expiration_minutes: i64,
    pub workflow_timeout_minutes: i64,
    pub activity_max_attempts: u32,
    pub queue_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            payment_expiration_minutes: crate::domain::expiration::DEFAULT_EXPIRATION_MINUTES,
            workflow_timeout_minutes: crate::workflow::DEFAULT_TIMEOUT_MINUTES,
            activity_max_attempts: 3,
            queue_max_attempts: crate::services::consumer::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            payment_expiration_minutes: config.payment_expiration_minutes,
            workflow_timeout_minutes: config.workflow_timeout_minutes,
            activity_max_attempts: config.activity_max_attempts,
            queue_max_attempts: config.queue_max_attempts,
        }
    }
}

/// The wired application: use cases, workflow runtime and queue plumbing.
#[derive(Clone)]
pub struct Services {
    pub repository: Arc<dyn PaymentRepository>,
    pub workflow_store: Arc<dyn WorkflowStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub clock: Arc<dyn Clock>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub create_payment: Arc<CreatePayment>,
    pub mark_as_paid: Arc<MarkAsPaid>,
    pub cancel_payment: Arc<CancelPayment>,
    pub refund_payment: Arc<RefundPayment>,
    pub notify_paid: Arc<NotifyPaymentPaid>,
    pub process_payment: Arc<ProcessPayment>,
    settings: Settings,
}

impl Services {
    pub fn build(adapters: Adapters, settings: Settings) -> Self {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ALL_EVENTS, Arc::new(LoggingEventHandler));
        let dispatcher = Arc::new(dispatcher);

        let orchestrator = Arc::new(
            WorkflowOrchestrator::new(adapters.workflow_store.clone(), adapters.clock.clone())
                .with_default_timeout(settings.workflow_timeout_minutes),
        );

        let create_payment = Arc::new(
            CreatePayment::new(
                adapters.repository.clone(),
                adapters.cart_gateway,
                adapters.payment_gateway,
                adapters.qr_renderer,
                dispatcher.clone(),
                adapters.clock.clone(),
            )
            .with_expiration(ExpirationPolicy::new(settings.payment_expiration_minutes))
            .with_workflows(orchestrator.clone()),
        );
        let mark_as_paid = Arc::new(MarkAsPaid::new(
            adapters.repository.clone(),
            dispatcher.clone(),
            adapters.clock.clone(),
        ));
        let cancel_payment = Arc::new(CancelPayment::new(
            adapters.repository.clone(),
            dispatcher.clone(),
            adapters.clock.clone(),
        ));
        let refund_payment = Arc::new(RefundPayment::new(
            adapters.repository.clone(),
            dispatcher.clone(),
            adapters.clock.clone(),
        ));
        let notify_paid = Arc::new(NotifyPaymentPaid::new(
            adapters.repository.clone(),
            adapters.publisher,
            dispatcher,
            adapters.clock.clone(),
        ));
        let process_payment = Arc::new(ProcessPayment::new(
            mark_as_paid.clone(),
            cancel_payment.clone(),
            refund_payment.clone(),
            notify_paid.clone(),
        ));

        Self {
            repository: adapters.repository,
            workflow_store: adapters.workflow_store,
            queue: adapters.queue,
            clock: adapters.clock,
            orchestrator,
            create_payment,
            mark_as_paid,
            cancel_payment,
            refund_payment,
            notify_paid,
            process_payment,
            settings,
        }
    }

    /// Handler for provider actions, routed through the payment's workflow first.
    pub fn process_handler(&self) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(self.process_payment.clone(), self.repository.clone())
            .with_workflows(self.orchestrator.clone())
    }

    pub fn consumers(&self) -> Vec<QueueConsumer> {
        vec![
            QueueConsumer::new(
                self.queue.clone(),
                PROCESS_PAYMENT_QUEUE,
                Arc::new(self.process_handler()),
            )
            .with_max_attempts(self.settings.queue_max_attempts),
            QueueConsumer::new(
                self.queue.clone(),
                CREATE_PAYMENT_QUEUE,
                Arc::new(CreatePaymentHandler::new(self.create_payment.clone())),
            )
            .with_max_attempts(self.settings.queue_max_attempts),
        ]
    }

    pub fn workflow_worker(&self) -> WorkflowWorker {
        let activities = UseCaseActivities::new(
            self.mark_as_paid.clone(),
            self.cancel_payment.clone(),
            self.notify_paid.clone(),
        );
        WorkflowWorker::new(
            self.workflow_store.clone(),
            Arc::new(activities),
            self.clock.clone(),
        )
        .with_retry_policy(
            RetryPolicy::default().with_max_attempts(self.settings.activity_max_attempts),
        )
    }
}

/// Everything a running process needs: the services plus the health checks
/// over the same connections.
pub struct Runtime {
    pub pool: PgPool,
    pub services: Services,
    pub health: HealthChecks,
}

pub async fn connect(config: &Config) -> Result<Runtime> {
    let pool = crate::db::create_pool(config)
        .await
        .context("Failed to connect to database")?;
    let queue = Arc::new(RedisQueue::new(&config.redis_url)?);

    let mut mercado_pago = MercadoPagoClient::new(
        config.mercado_pago_api_url.clone(),
        config.mercado_pago_access_token.clone(),
    );
    if let Some(email) = &config.mercado_pago_payer_email {
        mercado_pago = mercado_pago.with_payer_email(email.clone());
    }

    let qr_renderer: Arc<dyn QrCodeRenderer> = match &config.qr_renderer_url {
        Some(url) => Arc::new(HttpQrRenderer::new(url.clone())),
        None => {
            tracing::warn!("QR_RENDERER_URL not set, serving the PIX payload as the QR image");
            Arc::new(PayloadQrRenderer)
        }
    };

    let adapters = Adapters {
        repository: Arc::new(PostgresPaymentRepository::new(pool.clone())),
        workflow_store: Arc::new(PostgresWorkflowStore::new(pool.clone())),
        queue: queue.clone(),
        publisher: queue,
        cart_gateway: Arc::new(HttpCartGateway::new(config.cart_service_url.clone())),
        payment_gateway: Arc::new(mercado_pago.clone()),
        qr_renderer,
        clock: Arc::new(SystemClock),
    };

    let health = HealthChecks::new()
        .with("postgres", true, Arc::new(PostgresChecker::new(pool.clone())))
        .with("redis", true, Arc::new(RedisChecker::new(config.redis_url.clone())))
        .with("mercado_pago", false, Arc::new(MercadoPagoChecker::new(mercado_pago)));

    Ok(Runtime {
        pool,
        services: Services::build(adapters, Settings::from(config)),
        health,
    })
}

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub mercado_pago: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis && self.mercado_pago
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));
        println!("Mercado Pago API:      {}", status(self.mercado_pago));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        mercado_pago: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    if let Err(e) = validate_mercado_pago(&config.mercado_pago_api_url).await {
        report.mercado_pago = false;
        report.errors.push(format!("Mercado Pago: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.payment_expiration_minutes <= 0 {
        anyhow::bail!("PAYMENT_EXPIRATION_MINUTES must be positive");
    }
    if config.workflow_timeout_minutes <= 0 {
        anyhow::bail!("WORKFLOW_TIMEOUT_MINUTES must be positive");
    }

    url::Url::parse(&config.mercado_pago_api_url)
        .context("MERCADO_PAGO_API_URL is not a valid URL")?;
    url::Url::parse(&config.cart_service_url).context("CART_SERVICE_URL is not a valid URL")?;
    if let Some(qr_url) = &config.qr_renderer_url {
        url::Url::parse(qr_url).context("QR_RENDERER_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

/// Only checks that the API host answers; any HTTP status counts as reachable.
async fn validate_mercado_pago(api_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    client
        .get(api_url)
        .send()
        .await
        .context("Failed to reach Mercado Pago API")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/payments".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            mercado_pago_api_url: "https://api.mercadopago.com".to_string(),
            mercado_pago_access_token: "TEST-token".to_string(),
            mercado_pago_webhook_secret: None,
            mercado_pago_payer_email: None,
            cart_service_url: "http://localhost:4000".to_string(),
            qr_renderer_url: None,
            payment_expiration_minutes: 10,
            workflow_timeout_minutes: 30,
            activity_max_attempts: 3,
            queue_max_attempts: 5,
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_validate_env_vars_accepts_defaults() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let mut config = config();
        config.cart_service_url = "not-a-url".to_string();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_rejects_non_positive_windows() {
        let mut config = config();
        config.payment_expiration_minutes = 0;
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = config();
        config.queue_max_attempts = 9;
        let settings = Settings::from(&config);
        assert_eq!(settings.queue_max_attempts, 9);
        assert_eq!(settings.workflow_timeout_minutes, 30);
    }
}
