pub mod consumer;

pub use consumer::{
    dead_letter_queue, decide, requeue_dead_letters, run_consumer, ConsumerError,
    CreatePaymentHandler, Disposition, MessageHandler, ProcessPaymentHandler, QueueConsumer,
    CREATE_PAYMENT_QUEUE, DEFAULT_MAX_ATTEMPTS, PROCESS_PAYMENT_QUEUE,
};
