//! Application use cases. Each one loads what it needs through the ports,
//! drives the aggregate and dispatches the resulting events.

pub mod cancel_payment;
pub mod create_payment;
pub mod error;
pub mod mark_as_paid;
pub mod notify_payment;
pub mod process_payment;
pub mod reference;
pub mod refund_payment;
pub(crate) mod support;

pub use cancel_payment::CancelPayment;
pub use create_payment::{CreatePayment, CreatePaymentInput, CreatePaymentOutput};
pub use error::UseCaseError;
pub use mark_as_paid::MarkAsPaid;
pub use notify_payment::{NotifyPaymentPaid, PaymentPaidMessage};
pub use process_payment::{ProcessOutcome, ProcessPayment, ProviderAction};
pub use reference::PaymentReference;
pub use refund_payment::RefundPayment;
pub use support::execute_all_or_fail;
