use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::config::ProducerConfig;
use crate::transport::{MessageWriter, TransportError};

pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn error(&self, error: KafkaError, reason: &str) {
        error!("librdkafka producer error: {}: {}", error, reason);
    }
}

pub fn create_kafka_producer(
    config: &ProducerConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("acks", &config.kafka_producer_acks)
        .set("message.send.max.retries", config.max_retries().to_string())
        .set(
            "batch.num.messages",
            config.kafka_producer_batch_size.max(1).to_string(),
        )
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka configuration: {:?}", client_config);
    let api: FutureProducer<KafkaContext> = client_config.create_with_context(KafkaContext)?;

    // "Ping" the Kafka brokers by requesting metadata
    match api
        .client()
        .fetch_metadata(None, std::time::Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(api)
}

/// Writes to any topic through one librdkafka producer.
pub struct KafkaWriter {
    producer: FutureProducer<KafkaContext>,
    asynchronous: bool,
    flush_timeout: Duration,
}

impl KafkaWriter {
    pub fn new(config: &ProducerConfig) -> Result<Self, KafkaError> {
        Ok(Self {
            producer: create_kafka_producer(config)?,
            asynchronous: config.kafka_producer_async,
            flush_timeout: Duration::from_millis(config.kafka_message_timeout_ms.into()),
        })
    }

    async fn await_delivery(delivery: DeliveryFuture) -> Result<(), TransportError> {
        match delivery.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err((e, _))) => Err(TransportError::Kafka(e)),
            // The producer dropped the message before reporting, e.g. on shutdown
            Err(_) => Err(TransportError::Canceled),
        }
    }
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    async fn write(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), TransportError> {
        let record = FutureRecord {
            topic,
            key: Some(key),
            payload: Some(value),
            timestamp: None,
            partition: None,
            headers: None,
        };

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| TransportError::Kafka(e))?;

        if !self.asynchronous {
            return Self::await_delivery(delivery).await;
        }

        let topic = topic.to_owned();
        tokio::spawn(async move {
            if let Err(e) = Self::await_delivery(delivery).await {
                error!("async delivery to {} failed: {}", topic, e);
            }
        });
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.producer.flush(self.flush_timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::create_mock_writer;

    #[tokio::test]
    async fn writes_to_mock_cluster() {
        let (_cluster, writer) = create_mock_writer(false);

        writer
            .write("movie-events", b"movie-1", b"{\"action\":\"created\"}")
            .await
            .expect("failed to write to mocked kafka");
        writer.close().expect("failed to flush writer");
    }

    #[tokio::test]
    async fn async_writes_return_before_delivery() {
        let (_cluster, writer) = create_mock_writer(true);

        writer
            .write("actor-events", b"actor-7", b"{\"action\":\"deleted\"}")
            .await
            .expect("enqueue should succeed");
        writer.close().expect("failed to flush writer");
    }
}
