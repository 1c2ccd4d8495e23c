use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use mockito::Matcher;
use serde_json::json;
use std::str::FromStr;

use pix_payments::adapters::{HttpCartGateway, MercadoPagoClient};
use pix_payments::domain::{CartItem, IdempotencyKey, SessionId};
use pix_payments::ports::{CartGateway, CreatePaymentGateway, CreatePaymentRequest, GatewayError};

fn request(key: IdempotencyKey) -> CreatePaymentRequest {
    CreatePaymentRequest {
        amount: BigDecimal::from(100),
        items: vec![CartItem {
            sku: "SKU-1".to_string(),
            quantity: 2,
            unit_price: BigDecimal::from(50),
            title: Some("Burger".to_string()),
        }],
        idempotency_key: key,
        expiration: Utc.with_ymd_and_hms(2025, 1, 15, 12, 10, 0).unwrap(),
        external_reference: "7d0f6c1e-2f7a-4a55-9a55-0f1f5b1f2a10".to_string(),
    }
}

#[tokio::test]
async fn test_mercado_pago_creates_pix_payment() {
    let mut server = mockito::Server::new_async().await;
    let key = IdempotencyKey::generate();

    let mock = server
        .mock("POST", "/v1/payments")
        .match_header("authorization", "Bearer TEST-token")
        .match_header("x-idempotency-key", key.to_string().as_str())
        .match_body(Matcher::PartialJson(json!({
            "transaction_amount": 100.0,
            "payment_method_id": "pix",
            "external_reference": "7d0f6c1e-2f7a-4a55-9a55-0f1f5b1f2a10",
            "date_of_expiration": "2025-01-15T12:10:00.000+00:00",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 1319384011u64,
                "status": "pending",
                "point_of_interaction": {
                    "transaction_data": { "qr_code": "00020126580014br.gov.bcb.pix" }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = MercadoPagoClient::new(server.url(), "TEST-token".to_string());
    let payment = client.create_payment(&request(key)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(payment.external_payment_id, "1319384011");
    assert_eq!(payment.qr_code, "00020126580014br.gov.bcb.pix");
}

#[tokio::test]
async fn test_mercado_pago_rejection_keeps_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/payments")
        .with_status(400)
        .with_body(r#"{"message":"invalid transaction_amount"}"#)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(server.url(), "TEST-token".to_string());
    let err = client
        .create_payment(&request(IdempotencyKey::generate()))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn test_mercado_pago_circuit_opens_after_consecutive_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/payments")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let client =
        MercadoPagoClient::with_circuit_breaker(server.url(), "TEST-token".to_string(), 2, 60);

    for _ in 0..2 {
        let err = client
            .create_payment(&request(IdempotencyKey::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 500, .. }));
    }

    let err = client
        .create_payment(&request(IdempotencyKey::generate()))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitBreakerOpen(_)));
    assert_eq!(client.circuit_state(), "open");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cart_gateway_reads_items() {
    let mut server = mockito::Server::new_async().await;
    let session = SessionId::generate();

    server
        .mock("GET", format!("/carts/{}", session).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    { "sku": "SKU-1", "quantity": 2, "unit_price": "10.50", "title": "Fries" },
                    { "sku": "SKU-2", "quantity": 1, "unit_price": "5.00" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let cart = HttpCartGateway::new(server.url()).get_cart(&session).await.unwrap();

    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.items[0].unit_price, BigDecimal::from_str("10.50").unwrap());
    assert_eq!(cart.items[1].title, None);
}

#[tokio::test]
async fn test_cart_gateway_missing_cart_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let session = SessionId::generate();

    server
        .mock("GET", format!("/carts/{}", session).as_str())
        .with_status(404)
        .create_async()
        .await;

    let cart = HttpCartGateway::new(server.url()).get_cart(&session).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_cart_gateway_server_error_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let session = SessionId::generate();

    server
        .mock("GET", format!("/carts/{}", session).as_str())
        .with_status(503)
        .create_async()
        .await;

    let err = HttpCartGateway::new(server.url())
        .get_cart(&session)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Rejected { status: 503, .. }));
}
