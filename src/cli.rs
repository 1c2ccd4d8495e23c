use clap::{Parser, Subcommand};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::services::consumer::{requeue_dead_letters, run_consumer, MessageHandler};
use crate::startup::{self, Services};
use crate::use_cases::support::load_payment;
use crate::use_cases::{PaymentReference, ProviderAction};
use crate::workflow::{orchestrator::workflow_id_for, run_workflow_worker};
use crate::{create_app, AppState};

const WORKFLOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "pix-payments")]
#[command(about = "PIX payment lifecycle service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server, queue consumers and workflow worker (default)
    Serve,

    /// Run only the queue consumers and workflow worker
    Worker,

    /// Payment administration commands
    #[command(subcommand)]
    Payment(PaymentCommands),

    /// Queue maintenance commands
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Check connectivity of every dependency
    Check,
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Show a payment and its workflow
    Show {
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: Uuid,
    },

    /// Confirm a payment as if the provider had reported it processed
    MarkPaid {
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: Uuid,
    },

    /// Cancel a payment
    Cancel {
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: Uuid,
    },

    /// Refund a payment
    Refund {
        #[arg(value_name = "PAYMENT_ID")]
        payment_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Move dead-lettered messages back onto their queue
    RequeueDead {
        #[arg(value_name = "QUEUE")]
        queue: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => handle_serve(config).await,
        Commands::Worker => handle_worker(&config).await,
        Commands::Payment(command) => handle_payment(&config, command).await,
        Commands::Queue(QueueCommands::RequeueDead { queue }) => {
            handle_requeue_dead(&config, &queue).await
        }
        Commands::Db(DbCommands::Migrate) => handle_db_migrate(&config).await,
        Commands::Config => handle_config_validate(&config),
        Commands::Check => handle_check(&config).await,
    }
}

/// Starts every consumer and the workflow worker on their own tasks.
pub fn spawn_background(services: &Services) -> Vec<JoinHandle<()>> {
    let mut handles: Vec<JoinHandle<()>> = services
        .consumers()
        .into_iter()
        .map(|consumer| tokio::spawn(run_consumer(consumer)))
        .collect();
    handles.push(tokio::spawn(run_workflow_worker(
        services.workflow_worker(),
        WORKFLOW_POLL_INTERVAL,
    )));
    handles
}

pub async fn handle_serve(config: Config) -> anyhow::Result<()> {
    let runtime = startup::connect(&config).await?;
    crate::db::run_migrations(&runtime.pool).await?;

    let report = startup::validate_environment(&config, &runtime.pool).await?;
    if !report.is_valid() {
        report.print();
        if !report.environment || !report.database {
            anyhow::bail!("Startup validation failed");
        }
    }

    let background = spawn_background(&runtime.services);

    let app = create_app(AppState {
        services: runtime.services,
        health: runtime.health,
        webhook_secret: config.mercado_pago_webhook_secret.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in background {
        handle.abort();
    }
    Ok(())
}

pub async fn handle_worker(config: &Config) -> anyhow::Result<()> {
    let runtime = startup::connect(config).await?;
    let background = spawn_background(&runtime.services);
    tracing::info!(tasks = background.len(), "Worker started");

    shutdown_signal().await;
    for handle in background {
        handle.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

pub async fn handle_payment(config: &Config, command: PaymentCommands) -> anyhow::Result<()> {
    let runtime = startup::connect(config).await?;
    let services = &runtime.services;

    match command {
        PaymentCommands::Show { payment_id } => handle_payment_show(services, payment_id).await,
        PaymentCommands::MarkPaid { payment_id } => {
            handle_payment_action(services, payment_id, ProviderAction::Processed).await
        }
        PaymentCommands::Cancel { payment_id } => {
            handle_payment_action(services, payment_id, ProviderAction::Canceled).await
        }
        PaymentCommands::Refund { payment_id } => {
            handle_payment_action(services, payment_id, ProviderAction::Refunded).await
        }
    }
}

pub async fn handle_payment_show(services: &Services, payment_id: Uuid) -> anyhow::Result<()> {
    let payment = load_payment(services.repository.as_ref(), &PaymentReference::Id(payment_id)).await?;

    println!("Payment {}", payment.id());
    println!("  Status: {}", payment.status());
    println!("  Amount: {}", payment.amount());
    println!("  Expires At: {}", payment.expires_at());
    if let Some(provider) = payment.provider() {
        println!("  Provider: {} ({})", provider.provider(), provider.external_payment_id());
    }
    if let Some(at) = payment.canceled_at() {
        println!("  Canceled At: {}", at);
    }
    if let Some(at) = payment.refunded_at() {
        println!("  Refunded At: {}", at);
    }

    let workflow_id = workflow_id_for(&payment.idempotency_key());
    match services.orchestrator.describe(&workflow_id).await {
        Ok(instance) => {
            println!("  Workflow: {} ({})", workflow_id, instance.status);
            if let Some(outcome) = instance.outcome {
                println!("  Workflow Outcome: {}", outcome);
            }
        }
        Err(_) => println!("  Workflow: none"),
    }

    Ok(())
}

/// Applies the action the same way a provider webhook would, so a live
/// workflow gets the signal instead of racing the direct transition.
pub async fn handle_payment_action(
    services: &Services,
    payment_id: Uuid,
    action: ProviderAction,
) -> anyhow::Result<()> {
    let payload = json!({
        "paymentReference": payment_id.to_string(),
        "webhookPayload": { "action": action.as_str() },
    });

    services.process_handler().handle(&payload).await?;

    tracing::info!(%payment_id, %action, "Payment action submitted");
    println!("✓ {} submitted for payment {}", action, payment_id);
    Ok(())
}

pub async fn handle_requeue_dead(config: &Config, queue: &str) -> anyhow::Result<()> {
    let runtime = startup::connect(config).await?;
    let moved = requeue_dead_letters(runtime.services.queue.as_ref(), queue).await?;
    println!("✓ {} message(s) moved back to {}", moved, queue);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_check(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let report = startup::validate_environment(config, &pool).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("{} check(s) failed", report.errors.len());
    }
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Redis URL: {}", mask_password(&config.redis_url));
    println!("  Mercado Pago API URL: {}", config.mercado_pago_api_url);
    println!(
        "  Mercado Pago Webhook Secret: {}",
        if config.mercado_pago_webhook_secret.is_some() { "set" } else { "not set" }
    );
    println!("  Cart Service URL: {}", config.cart_service_url);
    println!(
        "  QR Renderer URL: {}",
        config.qr_renderer_url.as_deref().unwrap_or("(payload fallback)")
    );
    println!("  Payment Expiration: {} min", config.payment_expiration_minutes);
    println!("  Workflow Timeout: {} min", config.workflow_timeout_minutes);
    println!("  Activity Max Attempts: {}", config.activity_max_attempts);
    println!("  Queue Max Attempts: {}", config.queue_max_attempts);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
