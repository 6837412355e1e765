pub mod config;
pub mod kafka_consumer;
pub mod kafka_producer;
pub mod transport;

pub use transport::{ConsumedMessage, MessageReader, MessageWriter, TransportError};
