//! Message bus mechanics and the job lifecycle wire messages.

pub mod bus;
pub mod in_memory_bus;
pub mod messages;

pub use bus::{BusError, Delivery, MessageBus, Subscription};
pub use in_memory_bus::InMemoryMessageBus;
pub use messages::{
    decode, encode, CancellationMessage, DeadLetterMessage, WorkMessage, CANCELLATIONS_TOPIC,
    CANCELLATION_GROUP, DLQ_TOPIC, JOBS_TOPIC, WORKER_GROUP,
};
