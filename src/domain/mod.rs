//! Payment domain: the aggregate, its value objects and the events it raises.
//! Nothing in here touches storage, HTTP or the queue.

pub mod amount;
pub mod clock;
pub mod error;
pub mod events;
pub mod expiration;
pub mod payment;
pub mod value_objects;

pub use amount::{Cart, CartItem, PaymentAmountCalculator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{PaymentError, PaymentResult};
pub use events::{Entity, EventBuffer, EventSource, PaymentEvent};
pub use expiration::ExpirationPolicy;
pub use payment::{NewPayment, Payment, PersistedPayment};
pub use value_objects::{
    IdempotencyKey, PaymentDetail, PaymentProviderRef, PaymentStatus, PaymentType, ProviderName,
    SessionId,
};
