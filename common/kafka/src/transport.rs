use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::error::KafkaError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("operation canceled")]
    Canceled,
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport closed")]
    Closed,
}

/// A message read from a topic, detached from the consumer that read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub payload: Option<Bytes>,
}

/// Writes messages to any topic. Transient broker errors are retried by the
/// implementation; an `Err` means the write is terminally failed.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait MessageWriter: Send + Sync {
    async fn write(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}

/// Reads messages for one (topic, group) and commits their offsets.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Blocks until a message arrives, the transport errors, or `cancel` fires.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<ConsumedMessage, TransportError>;

    async fn commit(&self, message: &ConsumedMessage) -> Result<(), TransportError>;

    fn close(&self);
}
