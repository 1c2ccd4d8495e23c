use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::AppError;
use crate::handlers::auth::verify_signature;
use crate::ports::QueuePublisher;
use crate::services::consumer::PROCESS_PAYMENT_QUEUE;
use crate::utils::sanitize_json;
use crate::AppState;

pub const DATA_ID_PARAM: &str = "data.id";

/// Provider notifications. Nothing is processed here: once the signature
/// checks out the action is queued and the provider gets a 200.
pub async fn mercado_pago(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return AppError::Validation(format!("invalid webhook body: {}", e)).into_response()
        }
    };

    let data_id = data_id(&params, &payload);

    if let Some(secret) = &state.webhook_secret {
        if let Err(e) = verify_signature(secret, &headers, data_id.as_deref()) {
            return e.into_response();
        }
    }

    tracing::info!(payload = %sanitize_json(&payload), "Mercado Pago webhook received");

    let action = payload.get("action").and_then(Value::as_str);
    let (Some(reference), Some(action)) = (data_id, action) else {
        tracing::warn!("Webhook without data id or action, ignoring");
        return accepted(false);
    };

    let message = json!({
        "paymentReference": reference,
        "webhookPayload": payload,
    });

    if let Err(e) = state
        .services
        .queue
        .publish(PROCESS_PAYMENT_QUEUE, &message)
        .await
    {
        tracing::error!(%reference, action, error = %e, "Failed to queue webhook");
        return AppError::Unavailable("webhook could not be queued".to_string()).into_response();
    }

    tracing::info!(%reference, action, "Webhook queued for processing");
    accepted(true)
}

fn accepted(queued: bool) -> Response {
    (StatusCode::OK, Json(json!({ "received": true, "queued": queued }))).into_response()
}

/// `data.id` from the query string, falling back to the body. Numeric ids are
/// accepted and turned into strings.
fn data_id(params: &HashMap<String, String>, payload: &Value) -> Option<String> {
    if let Some(id) = params.get(DATA_ID_PARAM).filter(|id| !id.is_empty()) {
        return Some(id.clone());
    }

    match payload.get("data").and_then(|data| data.get("id")) {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_wins() {
        let params = HashMap::from([(DATA_ID_PARAM.to_string(), "from-query".to_string())]);
        let payload = json!({ "data": { "id": "from-body" } });
        assert_eq!(data_id(&params, &payload).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_body_id_string_or_number() {
        let params = HashMap::new();
        assert_eq!(
            data_id(&params, &json!({ "data": { "id": "ORD01" } })).as_deref(),
            Some("ORD01")
        );
        assert_eq!(
            data_id(&params, &json!({ "data": { "id": 123456 } })).as_deref(),
            Some("123456")
        );
        assert_eq!(data_id(&params, &json!({ "action": "order.processed" })), None);
    }
}
