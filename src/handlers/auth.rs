use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Verifies Mercado Pago's `x-signature: ts=<ts>,v1=<hex>` header.
///
/// The signed manifest is `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`,
/// with parts whose value is absent left out. Alphanumeric ids are lowercased.
pub fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    data_id: Option<&str>,
) -> Result<(), AuthError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingSignature)?;
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let (ts, v1) = parse_signature_header(header)?;
    let expected = hex::decode(v1).map_err(|_| AuthError::InvalidSignatureFormat)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidSecret)?;
    mac.update(manifest(data_id, request_id, ts).as_bytes());

    mac.verify_slice(&expected)
        .map_err(|_| AuthError::SignatureMismatch)
}

pub fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        let id = if id.chars().all(char::is_alphanumeric) {
            id.to_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{};", id));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

/// Signs a manifest the way the provider does. Used to build test fixtures.
pub fn sign(secret: &str, data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(manifest(data_id, request_id, ts).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn parse_signature_header(header: &str) -> Result<(&str, &str), AuthError> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    match (ts, v1) {
        (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Ok((ts, v1)),
        _ => Err(AuthError::InvalidSignatureFormat),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingSignature,
    InvalidSignatureFormat,
    InvalidSecret,
    SignatureMismatch,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "Missing x-signature header")
            }
            AuthError::InvalidSignatureFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid signature format")
            }
            AuthError::InvalidSecret => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid webhook secret configuration")
            }
            AuthError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed")
            }
        };

        tracing::warn!("Webhook authentication failed: {:?}", self);
        (status, message).into_response()
    }
}
