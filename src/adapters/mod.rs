//! Implementations of the ports: Postgres, Redis, HTTP gateways and in-memory doubles.

pub mod cart_client;
pub mod in_memory;
pub mod mercado_pago;
pub mod postgres_payment_repository;
pub mod postgres_workflow_store;
pub mod qr_renderer;
pub mod redis_queue;

pub use cart_client::HttpCartGateway;
pub use in_memory::{InMemoryPaymentRepository, InMemoryQueue, InMemoryWorkflowStore};
pub use mercado_pago::MercadoPagoClient;
pub use postgres_payment_repository::PostgresPaymentRepository;
pub use postgres_workflow_store::PostgresWorkflowStore;
pub use qr_renderer::{HttpQrRenderer, PayloadQrRenderer};
pub use redis_queue::RedisQueue;
