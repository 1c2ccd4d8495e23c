use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::adapters::MercadoPagoClient;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct RedisChecker {
    url: String,
}

impl RedisChecker {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let client = match redis::Client::open(self.url.as_str()) {
            Ok(client) => client,
            Err(e) => return DependencyStatus::unhealthy(e),
        };
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => return DependencyStatus::unhealthy(e),
        };
        match redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
        {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

/// Reports the provider as unhealthy while its circuit breaker is open.
pub struct MercadoPagoChecker {
    client: MercadoPagoClient,
}

impl MercadoPagoChecker {
    pub fn new(client: MercadoPagoClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for MercadoPagoChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.circuit_state().as_str() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {}", state)),
        }
    }
}

#[derive(Clone)]
pub struct NamedChecker {
    pub name: String,
    pub critical: bool,
    pub checker: Arc<dyn DependencyChecker>,
}

/// The set of dependencies `/health` reports on.
#[derive(Clone)]
pub struct HealthChecks {
    checkers: Vec<NamedChecker>,
    start_time: Instant,
    timeout: Duration,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecks {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
            start_time: Instant::now(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with(mut self, name: &str, critical: bool, checker: Arc<dyn DependencyChecker>) -> Self {
        self.checkers.push(NamedChecker {
            name: name.to_string(),
            critical,
            checker,
        });
        self
    }

    pub async fn check(&self) -> HealthResponse {
        let results = join_all(self.checkers.iter().map(|named| async move {
            let status = timeout(self.timeout, named.checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            (named, status)
        }))
        .await;

        let mut critical_failure = false;
        let mut degraded = false;
        let mut dependencies = HashMap::new();
        for (named, status) in results {
            if matches!(status, DependencyStatus::Unhealthy { .. }) {
                if named.critical {
                    critical_failure = true;
                } else {
                    degraded = true;
                }
            }
            dependencies.insert(named.name.clone(), status);
        }

        HealthResponse {
            status: overall_status(critical_failure, degraded).to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

fn overall_status(critical_failure: bool, degraded: bool) -> &'static str {
    if critical_failure {
        "unhealthy"
    } else if degraded {
        "degraded"
    } else {
        "healthy"
    }
}
