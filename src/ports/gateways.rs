use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Cart, CartItem, IdempotencyKey, ProviderName, SessionId};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait CartGateway: Send + Sync {
    async fn get_cart(&self, session_id: &SessionId) -> GatewayResult<Cart>;
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub amount: BigDecimal,
    pub items: Vec<CartItem>,
    pub idempotency_key: IdempotencyKey,
    pub expiration: DateTime<Utc>,
    /// Our payment id, echoed back by the provider.
    pub external_reference: String,
}

/// What the provider returns for a freshly created PIX charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPayment {
    pub qr_code: String,
    pub external_payment_id: String,
}

#[async_trait]
pub trait CreatePaymentGateway: Send + Sync {
    fn provider(&self) -> ProviderName;

    async fn create_payment(&self, request: &CreatePaymentRequest) -> GatewayResult<ProviderPayment>;
}

#[async_trait]
pub trait QrCodeRenderer: Send + Sync {
    /// Turns a PIX copy-and-paste payload into a base64 image (data URL).
    async fn render(&self, payload: &str) -> GatewayResult<String>;
}
