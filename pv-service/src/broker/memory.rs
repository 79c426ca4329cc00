use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Channel, DeliveryStream, Publisher, Subscriber};
use crate::pipeline::PipelineError;

#[derive(Default)]
struct Queue {
    /// Messages published while no consumer is attached.
    backlog: VecDeque<Vec<u8>>,
    consumer: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl Queue {
    fn has_live_consumer(&self) -> bool {
        self.consumer.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Named FIFO queues living inside the current process.
///
/// Publishing to an undeclared queue declares it. Each queue accepts one
/// consumer at a time; when that consumer goes away, later messages are kept
/// for the next one.
#[derive(Default)]
pub struct InMemoryChannel {
    queues: Mutex<HashMap<String, Queue>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Messages waiting for a consumer on `queue`.
    pub async fn backlog_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.backlog.len())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Channel for InMemoryChannel {
    async fn open_channel(&self, queue: &str) -> Result<(), PipelineError> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_channel(&self, queue: &str) -> Result<(), PipelineError> {
        if self.queues.lock().await.remove(queue).is_some() {
            tracing::debug!(queue, "queue deleted");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for InMemoryChannel {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), PipelineError> {
        let mut queues = self.queues.lock().await;
        let q = queues.entry(queue.to_string()).or_default();

        let payload = match &q.consumer {
            Some(tx) => match tx.send(payload) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(payload)) => payload,
            },
            None => payload,
        };

        q.consumer = None;
        q.backlog.push_back(payload);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Subscriber for InMemoryChannel {
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, PipelineError> {
        let mut queues = self.queues.lock().await;
        let q = queues.entry(queue.to_string()).or_default();

        if q.has_live_consumer() {
            return Err(PipelineError::Channel(format!(
                "queue '{queue}' already has a consumer"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for payload in q.backlog.drain(..) {
            // rx is alive in this scope, the send cannot fail
            let _ = tx.send(payload);
        }
        q.consumer = Some(tx);

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
