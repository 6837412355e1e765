pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
pub mod producer;

pub use config::Config;
pub use consumer::{Consumer, ConsumerState};
pub use lifecycle::ConsumerGroup;
pub use metrics::{MetricsSink, PrometheusSink};
pub use pool::{Envelope, PoolConfig, PoolError, ProducerPool};
pub use producer::{dead_letter_payload, EventProducer, Producer, ProducerError};
