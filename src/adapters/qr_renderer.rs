use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use std::time::Duration;

use crate::ports::{GatewayError, GatewayResult, QrCodeRenderer};

/// Renders through an image service: `GET {base}?data=<payload>` must answer
/// with image bytes, which come back as a base64 data URL.
#[derive(Clone)]
pub struct HttpQrRenderer {
    client: Client,
    base_url: String,
}

impl HttpQrRenderer {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

#[async_trait]
impl QrCodeRenderer for HttpQrRenderer {
    async fn render(&self, payload: &str) -> GatewayResult<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("data", payload), ("format", "png")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(GatewayError::InvalidResponse(format!(
                "expected an image, got {}",
                content_type
            )));
        }

        let bytes = response.bytes().await?;
        Ok(data_url(&content_type, &bytes))
    }
}

/// Fallback when no image service is configured: the PIX copy-and-paste
/// payload itself, base64 encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadQrRenderer;

#[async_trait]
impl QrCodeRenderer for PayloadQrRenderer {
    async fn render(&self, payload: &str) -> GatewayResult<String> {
        if payload.trim().is_empty() {
            return Err(GatewayError::InvalidResponse("empty PIX payload".to_string()));
        }
        Ok(data_url("text/plain", payload.as_bytes()))
    }
}

fn data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}
