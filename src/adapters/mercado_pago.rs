use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use chrono::SecondsFormat;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::ProviderName;
use crate::ports::{
    CreatePaymentGateway, CreatePaymentRequest, GatewayError, GatewayResult, ProviderPayment,
};

const PIX_METHOD: &str = "pix";
const DEFAULT_DESCRIPTION: &str = "PIX payment";

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Serialize)]
struct PaymentBody {
    transaction_amount: f64,
    description: String,
    payment_method_id: &'static str,
    external_reference: String,
    date_of_expiration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Payer>,
    additional_info: AdditionalInfo,
}

#[derive(Debug, Serialize)]
struct Payer {
    email: String,
}

#[derive(Debug, Serialize)]
struct AdditionalInfo {
    items: Vec<Item>,
}

#[derive(Debug, Serialize)]
struct Item {
    id: String,
    title: String,
    quantity: u32,
    unit_price: f64,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    qr_code: Option<String>,
}

/// Mercado Pago payments API client, guarded by a circuit breaker.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    base_url: String,
    access_token: String,
    payer_email: Option<String>,
    circuit_breaker: Breaker,
}

impl MercadoPagoClient {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self::with_circuit_breaker(base_url, access_token, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        access_token: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            access_token,
            payer_email: None,
            circuit_breaker,
        }
    }

    pub fn with_payer_email(mut self, email: impl Into<String>) -> Self {
        self.payer_email = Some(email.into());
        self
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn body(&self, request: &CreatePaymentRequest) -> GatewayResult<PaymentBody> {
        let to_f64 = |value: &bigdecimal::BigDecimal| {
            value
                .to_f64()
                .ok_or_else(|| GatewayError::InvalidResponse(format!("amount {} out of range", value)))
        };

        let items = request
            .items
            .iter()
            .map(|item| {
                Ok(Item {
                    id: item.sku.clone(),
                    title: item.title.clone().unwrap_or_else(|| item.sku.clone()),
                    quantity: item.quantity,
                    unit_price: to_f64(&item.unit_price)?,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(PaymentBody {
            transaction_amount: to_f64(&request.amount)?,
            description: DEFAULT_DESCRIPTION.to_string(),
            payment_method_id: PIX_METHOD,
            external_reference: request.external_reference.clone(),
            date_of_expiration: request
                .expiration
                .to_rfc3339_opts(SecondsFormat::Millis, false),
            payer: self.payer_email.clone().map(|email| Payer { email }),
            additional_info: AdditionalInfo { items },
        })
    }
}

#[async_trait]
impl CreatePaymentGateway for MercadoPagoClient {
    fn provider(&self) -> ProviderName {
        ProviderName::MercadoPago
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> GatewayResult<ProviderPayment> {
        let url = format!("{}/v1/payments", self.base_url.trim_end_matches('/'));
        let body = self.body(request)?;
        let client = self.client.clone();
        let token = self.access_token.clone();
        let idempotency_key = request.idempotency_key.to_string();

        debug!(external_reference = %request.external_reference, "Creating Mercado Pago PIX payment");

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(token)
                    .header("X-Idempotency-Key", idempotency_key)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(GatewayError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }

                let payload = response.json::<PaymentResponse>().await?;
                parse_payment(payload)
            })
            .await;

        match result {
            Ok(payment) => Ok(payment),
            Err(FailsafeError::Rejected) => {
                warn!("Mercado Pago circuit breaker is open");
                Err(GatewayError::CircuitBreakerOpen(
                    "Mercado Pago circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn parse_payment(payload: PaymentResponse) -> GatewayResult<ProviderPayment> {
    let external_payment_id = match payload.id {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) if !s.is_empty() => s,
        other => {
            return Err(GatewayError::InvalidResponse(format!(
                "unexpected payment id {}",
                other
            )))
        }
    };

    let qr_code = payload
        .point_of_interaction
        .and_then(|poi| poi.transaction_data)
        .and_then(|data| data.qr_code)
        .filter(|qr| !qr.is_empty())
        .ok_or_else(|| GatewayError::InvalidResponse("missing PIX qr_code".to_string()))?;

    Ok(ProviderPayment {
        qr_code,
        external_payment_id,
    })
}
