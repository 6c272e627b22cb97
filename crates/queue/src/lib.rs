pub mod error;
pub mod memory;
pub mod parser;
pub mod sqs;
pub mod transport;

pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use parser::{decode, encode};
pub use sqs::SqsQueue;
pub use transport::{delivery_delay, Delivery, QueueConsumer, QueueProducer, MAX_DELIVERY_DELAY};
