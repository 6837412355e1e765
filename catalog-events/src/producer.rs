use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_kafka::config::ProducerConfig;
use common_kafka::kafka_producer::KafkaWriter;
use common_kafka::{MessageWriter, TransportError};
use rdkafka::error::KafkaError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("failed to deliver message: {0}")]
    Delivery(TransportError),
    #[error("failed to deliver message: {original}; dead-letter write also failed: {dead_letter}")]
    DeadLetter {
        original: TransportError,
        dead_letter: TransportError,
    },
    #[error("failed to close writer: {0}")]
    Close(TransportError),
    #[error("producer already closed")]
    Closed,
}

/// Publishes one message and waits for the outcome.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn produce(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), ProducerError>;

    fn close(&self) -> Result<(), ProducerError>;
}

/// The value written to the dead-letter topic for a failed message.
/// Consumers of the DLQ parse this exact layout.
pub fn dead_letter_payload(topic: &str, error: &TransportError, value: &[u8]) -> String {
    format!(
        "original_topic: {}, error: {}, message: {}",
        topic,
        error,
        String::from_utf8_lossy(value)
    )
}

struct DeadLetter<W> {
    writer: Arc<W>,
    topic: String,
    timeout: Duration,
}

pub struct Producer<W: MessageWriter> {
    writer: W,
    dead_letter: Option<DeadLetter<W>>,
    closed: AtomicBool,
}

impl Producer<KafkaWriter> {
    /// Connects the primary writer and, when a DLQ topic is configured, a
    /// second writer dedicated to dead letters.
    pub fn from_config(config: &ProducerConfig) -> Result<Self, KafkaError> {
        let writer = KafkaWriter::new(config)?;
        let producer = match config.dlq_topic() {
            Some(topic) => Self::with_dead_letter(
                writer,
                KafkaWriter::new(config)?,
                topic,
                Duration::from_millis(config.kafka_dlq_write_timeout_ms),
            ),
            None => Self::new(writer),
        };
        Ok(producer)
    }
}

impl<W: MessageWriter + 'static> Producer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            dead_letter: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_dead_letter(writer: W, dlq_writer: W, topic: &str, timeout: Duration) -> Self {
        Self {
            writer,
            dead_letter: Some(DeadLetter {
                writer: Arc::new(dlq_writer),
                topic: topic.to_owned(),
                timeout,
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn dead_letter_topic(&self) -> Option<&str> {
        self.dead_letter.as_ref().map(|d| d.topic.as_str())
    }

    async fn write_dead_letter(
        dead_letter: &DeadLetter<W>,
        key: &[u8],
        payload: String,
    ) -> Result<(), TransportError> {
        let writer = dead_letter.writer.clone();
        let topic = dead_letter.topic.clone();
        let timeout = dead_letter.timeout;
        let key = key.to_vec();

        // Spawned so the write completes even if the caller stops polling us
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, writer.write(&topic, &key, payload.as_bytes()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("dead-letter write task failed: {}", e);
                Err(TransportError::Canceled)
            }
        }
    }
}

#[async_trait]
impl<W: MessageWriter + 'static> EventProducer for Producer<W> {
    async fn produce(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), ProducerError> {
        let original = match self.writer.write(topic, key, value).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        error!("failed to produce message to {}: {}", topic, original);

        let Some(dead_letter) = &self.dead_letter else {
            return Err(ProducerError::Delivery(original));
        };

        let payload = dead_letter_payload(topic, &original, value);
        match Self::write_dead_letter(dead_letter, key, payload).await {
            Ok(()) => {
                warn!(
                    "message for {} preserved in dead-letter topic {}",
                    topic, dead_letter.topic
                );
                Err(ProducerError::Delivery(original))
            }
            Err(dlq_error) => {
                error!(
                    "failed to write dead letter to {}: {}",
                    dead_letter.topic, dlq_error
                );
                Err(ProducerError::DeadLetter {
                    original,
                    dead_letter: dlq_error,
                })
            }
        }
    }

    fn close(&self) -> Result<(), ProducerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ProducerError::Closed);
        }

        let primary = self.writer.close();
        let secondary = match &self.dead_letter {
            Some(dead_letter) => dead_letter.writer.close(),
            None => Ok(()),
        };

        match (primary, secondary) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), other) => {
                if let Err(dlq_error) = other {
                    error!("failed to close dead-letter writer: {}", dlq_error);
                }
                Err(ProducerError::Close(e))
            }
            (Ok(()), Err(e)) => Err(ProducerError::Close(e)),
        }
    }
}
