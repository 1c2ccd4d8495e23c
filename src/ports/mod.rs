//! Interfaces the payment core depends on. Adapters live in `crate::adapters`.

pub mod gateways;
pub mod queue;
pub mod repository;
pub mod workflow_store;

pub use gateways::{
    CartGateway, CreatePaymentGateway, CreatePaymentRequest, GatewayError, GatewayResult,
    ProviderPayment, QrCodeRenderer,
};
pub use queue::{MessageQueue, QueueError, QueuePublisher, QueueResult};
pub use repository::{PaymentRepository, RepositoryError, RepositoryResult};
pub use workflow_store::WorkflowStore;
