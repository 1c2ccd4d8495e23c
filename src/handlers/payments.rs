use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{IdempotencyKey, Payment, SessionId};
use crate::error::AppError;
use crate::use_cases::support::load_payment;
use crate::use_cases::{CreatePaymentInput, PaymentReference};
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    pub session_id: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub image: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub status: String,
    pub amount: BigDecimal,
    pub payment_type: String,
    pub expires_at: DateTime<Utc>,
    pub provider: Option<String>,
    pub external_payment_id: Option<String>,
    pub qr_code: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id(),
            status: payment.status().to_string(),
            amount: payment.amount().clone(),
            payment_type: payment.payment_type().to_string(),
            expires_at: payment.expires_at(),
            provider: payment.provider().map(|p| p.provider().to_string()),
            external_payment_id: payment.provider().map(|p| p.external_payment_id().to_string()),
            qr_code: payment.detail().map(|d| d.qr_code().to_string()),
            canceled_at: payment.canceled_at(),
            refunded_at: payment.refunded_at(),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
        }
    }
}

/// The `Idempotency-Key` header wins over the body field.
fn idempotency_key(headers: &HeaderMap, body: &CreatePaymentBody) -> Result<IdempotencyKey, AppError> {
    let raw = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(body.idempotency_key.as_deref())
        .ok_or_else(|| AppError::Validation("idempotency key is required".to_string()))?;

    Ok(IdempotencyKey::parse(raw)?)
}

pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentBody>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    let idempotency_key = idempotency_key(&headers, &body)?;
    let session_id = SessionId::parse(&body.session_id)?;

    let output = state
        .services
        .create_payment
        .execute(CreatePaymentInput {
            session_id,
            idempotency_key,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment_id: output.payment_id,
            image: output.image,
            expires_at: output.expires_at,
        }),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentView>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Validation(format!("invalid payment id: {}", id)))?;

    let payment = load_payment(state.services.repository.as_ref(), &PaymentReference::Id(id)).await?;
    Ok(Json(PaymentView::from(&payment)))
}
