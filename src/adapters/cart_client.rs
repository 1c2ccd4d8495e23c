use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::domain::{Cart, SessionId};
use crate::ports::{CartGateway, GatewayError, GatewayResult};

/// HTTP client for the cart service: `GET {base}/carts/{session_id}`.
/// A missing cart comes back as an empty one.
#[derive(Clone)]
pub struct HttpCartGateway {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpCartGateway {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            circuit_breaker,
        }
    }
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    async fn get_cart(&self, session_id: &SessionId) -> GatewayResult<Cart> {
        let url = format!(
            "{}/carts/{}",
            self.base_url.trim_end_matches('/'),
            session_id
        );
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;

                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(Cart::default());
                }
                if !response.status().is_success() {
                    return Err(GatewayError::Rejected {
                        status: response.status().as_u16(),
                        message: response.text().await.unwrap_or_default(),
                    });
                }

                let cart = response.json::<Cart>().await?;
                Ok(cart)
            })
            .await;

        match result {
            Ok(cart) => Ok(cart),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "cart service circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
