use std::sync::Arc;

use common_kafka::MessageReader;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::consumer::Consumer;

/// Consumer loops sharing one cancellation signal. `shutdown` is the wait
/// barrier: it returns once every loop has observed cancellation and every
/// consumer has been closed.
pub struct ConsumerGroup<R: MessageReader> {
    consumers: Vec<Arc<Consumer<R>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<R: MessageReader + 'static> ConsumerGroup<R> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            consumers: Vec::new(),
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    pub fn spawn(&mut self, consumer: Consumer<R>) -> Arc<Consumer<R>> {
        let consumer = Arc::new(consumer);
        let task_consumer = consumer.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            task_consumer.consume_messages(&cancel).await;
        });
        self.consumers.push(consumer.clone());
        consumer
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        info!("waiting for {} consumers to stop", self.tracker.len());
        self.tracker.wait().await;

        for consumer in &self.consumers {
            consumer.close();
        }
        info!("all consumers stopped");
    }
}

pub async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}
