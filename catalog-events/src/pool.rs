use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::MetricsSink;
use crate::producer::{EventProducer, ProducerError};

/// One unit of work queued for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub key: Bytes,
    pub value: Bytes,
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("producer buffer is full")]
    BufferFull,
    #[error("producer pool is closed")]
    Closed,
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("producer worker panicked: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub buffer_size: usize,
}

// The permit frees its buffer slot once the worker has finished publishing
type Queued = (Envelope, OwnedSemaphorePermit);

/// Bounded, non-blocking front door to an `EventProducer`.
///
/// `produce` never waits: an envelope is either accepted or rejected. The
/// buffer bounds envelopes that are accepted but not yet published, so an
/// envelope holds its slot until a worker is done with it. A fixed set of
/// workers drains the queue, each publishing one envelope at a time.
/// `close` stops intake, lets the workers drain what was accepted and then
/// closes the producer.
pub struct ProducerPool<P: EventProducer> {
    sender: RwLock<Option<mpsc::Sender<Queued>>>,
    slots: Arc<Semaphore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    producer: Arc<P>,
    metrics: Arc<dyn MetricsSink>,
    worker_count: usize,
    capacity: usize,
}

impl<P: EventProducer + 'static> ProducerPool<P> {
    pub fn start(
        producer: Arc<P>,
        config: PoolConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::InvalidConfig("at least one worker is required"));
        }
        if config.buffer_size == 0 {
            return Err(PoolError::InvalidConfig("buffer size must be positive"));
        }

        let (sender, receiver) = mpsc::channel::<Queued>(config.buffer_size);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        info!(
            "starting producer pool with {} workers and a buffer of {}",
            config.workers, config.buffer_size
        );
        let workers = (0..config.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    receiver.clone(),
                    producer.clone(),
                    metrics.clone(),
                ))
            })
            .collect();

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            slots: Arc::new(Semaphore::new(config.buffer_size)),
            workers: Mutex::new(workers),
            producer,
            metrics,
            worker_count: config.workers,
            capacity: config.buffer_size,
        })
    }

    /// Queue an envelope without blocking. An error means the event will not
    /// be delivered; callers treat it as best-effort and carry on.
    pub fn produce(
        &self,
        topic: impl Into<String>,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), PoolError> {
        let envelope = Envelope {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        };

        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };

        let Ok(permit) = self.slots.clone().try_acquire_owned() else {
            return Err(self.reject(&envelope));
        };

        // Holding a slot guarantees channel room, so sending only fails once
        // every worker has exited
        sender
            .try_send((envelope, permit))
            .map_err(|_| PoolError::Closed)
    }

    fn reject(&self, envelope: &Envelope) -> PoolError {
        self.metrics.dropped();
        error!("producer buffer full, dropping message for {}", envelope.topic);
        PoolError::BufferFull
    }

    /// Stop accepting envelopes, wait for the workers to publish everything
    /// already queued, then close the producer.
    pub async fn close(&self) -> Result<(), PoolError> {
        let Some(sender) = self.sender.write().take() else {
            return Err(PoolError::Closed);
        };
        // Dropping the only sender lets workers drain the queue and exit
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        info!("waiting for {} producer workers to drain", workers.len());

        let mut first_error = None;
        for handle in workers {
            if let Err(e) = handle.await {
                error!("producer worker exited abnormally: {}", e);
                first_error.get_or_insert(PoolError::Worker(e));
            }
        }

        if let Err(e) = self.producer.close() {
            if let Some(worker_error) = first_error {
                error!(
                    "producer close failed after a worker error: {}",
                    worker_error
                );
            }
            return Err(e.into());
        }
        info!("producer pool closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Envelopes accepted but not yet fully published.
    pub fn queued(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}

async fn run_worker<P: EventProducer>(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Queued>>>,
    producer: Arc<P>,
    metrics: Arc<dyn MetricsSink>,
) {
    info!("producer worker {} started", id);
    loop {
        // Hold the lock only while waiting for the next envelope, not while publishing
        let next = receiver.lock().await.recv().await;
        let Some((envelope, _slot)) = next else {
            break;
        };

        match producer
            .produce(&envelope.topic, &envelope.key, &envelope.value)
            .await
        {
            Ok(()) => metrics.produced(),
            Err(e) => {
                metrics.produce_error();
                error!(
                    "producer worker {} failed to publish to {}: {}",
                    id, envelope.topic, e
                );
            }
        }
    }
    info!("producer worker {} shutting down", id);
}
