use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::domain::expiration::DEFAULT_EXPIRATION_MINUTES;
use crate::workflow::DEFAULT_TIMEOUT_MINUTES;

pub const DEFAULT_MERCADO_PAGO_API_URL: &str = "https://api.mercadopago.com";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub mercado_pago_api_url: String,
    pub mercado_pago_access_token: String,
    /// Webhook signatures are only checked when this is set.
    pub mercado_pago_webhook_secret: Option<String>,
    pub mercado_pago_payer_email: Option<String>,
    pub cart_service_url: String,
    pub qr_renderer_url: Option<String>,
    pub payment_expiration_minutes: i64,
    pub workflow_timeout_minutes: i64,
    pub activity_max_attempts: u32,
    pub queue_max_attempts: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            mercado_pago_api_url: optional("MERCADO_PAGO_API_URL")
                .unwrap_or_else(|| DEFAULT_MERCADO_PAGO_API_URL.to_string()),
            mercado_pago_access_token: required("MERCADO_PAGO_ACCESS_TOKEN")?,
            mercado_pago_webhook_secret: optional("MERCADO_PAGO_WEBHOOK_SECRET"),
            mercado_pago_payer_email: optional("MERCADO_PAGO_PAYER_EMAIL"),
            cart_service_url: required("CART_SERVICE_URL")?,
            qr_renderer_url: optional("QR_RENDERER_URL"),
            payment_expiration_minutes: parse_or(
                &lookup,
                "PAYMENT_EXPIRATION_MINUTES",
                DEFAULT_EXPIRATION_MINUTES,
            )?,
            workflow_timeout_minutes: parse_or(
                &lookup,
                "WORKFLOW_TIMEOUT_MINUTES",
                DEFAULT_TIMEOUT_MINUTES,
            )?,
            activity_max_attempts: parse_or(&lookup, "ACTIVITY_MAX_ATTEMPTS", 3)?,
            queue_max_attempts: parse_or(&lookup, "QUEUE_MAX_ATTEMPTS", 5)?,
            log_format: match optional("LOG_FORMAT").as_deref().map(str::to_lowercase) {
                Some(f) if f == "json" => LogFormat::Json,
                _ => LogFormat::Text,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}
