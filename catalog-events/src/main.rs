use std::sync::Arc;

use anyhow::{Context, Result};
use envconfig::Envconfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use catalog_events::lifecycle::wait_for_shutdown_signal;
use catalog_events::metrics::{metrics_router, serve, setup_metrics_recorder};
use catalog_events::{
    Config, Consumer, ConsumerGroup, MetricsSink, Producer, ProducerPool, PrometheusSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(EnvFilter::from_default_env())
        .boxed();
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env()
        .context("Failed to load configuration from environment variables")?;
    info!("Configuration loaded: {:?}", config);

    let recorder = if config.export_prometheus {
        Some(setup_metrics_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };
    let bind = config.bind();
    let server = tokio::spawn(async move {
        if let Err(e) = serve(metrics_router(recorder), &bind).await {
            error!("metrics server failed: {}", e);
        }
    });
    info!("Started metrics server on {}", config.bind());

    let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusSink);

    let producer =
        Producer::from_config(&config.producer).context("Failed to create Kafka producer")?;
    if let Some(topic) = producer.dead_letter_topic() {
        info!("dead-letter topic enabled: {}", topic);
    }
    let pool = ProducerPool::start(Arc::new(producer), config.pool(), metrics.clone())
        .context("Failed to start producer pool")?;

    let mut consumers = ConsumerGroup::new(CancellationToken::new());
    for consumer_config in config.consumer_configs() {
        let consumer =
            Consumer::from_config(&consumer_config, metrics.clone()).with_context(|| {
                format!(
                    "Failed to create consumer for {}",
                    consumer_config.kafka_consumer_topic
                )
            })?;
        consumers.spawn(consumer);
    }
    info!("Started {} consumers", consumers.len());

    wait_for_shutdown_signal().await;

    let ((), pool_result) = tokio::join!(consumers.shutdown(), pool.close());
    if let Err(e) = pool_result {
        error!("producer pool did not shut down cleanly: {}", e);
    }

    server.abort();
    info!("catalog events stopped");
    Ok(())
}
