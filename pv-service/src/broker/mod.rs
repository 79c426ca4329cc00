//! Message channel capability: named FIFO queues keyed by meter id.
//!
//! Producers publish opaque payloads; the consumer binds one handler per queue
//! and runs a single dispatch loop that hands each delivery to its handler in
//! arrival order.

pub mod http;
pub mod memory;

use std::{pin::Pin, sync::Arc};

use futures::{stream::SelectAll, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Envelope, MessageHandler, PipelineError};

pub use http::{HttpChannelClient, HttpChannelServer};
pub use memory::InMemoryChannel;

pub type DeliveryStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Queue declaration and teardown, shared by both sides of a channel.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    /// Declares `queue`. Idempotent.
    async fn open_channel(&self, queue: &str) -> Result<(), PipelineError>;

    /// Deletes `queue` and ends its delivery stream. Idempotent.
    async fn delete_channel(&self, queue: &str) -> Result<(), PipelineError>;
}

#[async_trait::async_trait]
pub trait Publisher: Channel {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), PipelineError>;
}

#[async_trait::async_trait]
pub trait Subscriber: Channel {
    /// Attaches the single consumer of `queue`. Messages published before the
    /// call are delivered first, in publish order.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, PipelineError>;
}

struct Binding {
    queue: String,
    handler: Box<dyn MessageHandler>,
}

/// Single-threaded dispatch loop over every bound queue.
pub struct Consumer<C> {
    channel: Arc<C>,
    bindings: Vec<Binding>,
    stop: CancellationToken,
}

impl<C> Consumer<C>
where
    C: Subscriber + 'static,
{
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            bindings: Vec::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.queue.as_str())
    }

    /// Declares `queue` and routes its deliveries to `handler`.
    pub async fn bind_messages(
        &mut self,
        queue: impl Into<String>,
        handler: Box<dyn MessageHandler>,
    ) -> Result<(), PipelineError> {
        let queue = queue.into();
        if self.bindings.iter().any(|b| b.queue == queue) {
            return Err(PipelineError::Channel(format!(
                "queue '{queue}' already has a bound handler"
            )));
        }

        self.channel.open_channel(&queue).await?;
        tracing::info!(queue = %queue, "handler bound");
        self.bindings.push(Binding { queue, handler });
        Ok(())
    }

    /// Token that unblocks `start_consuming` when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop_consuming(&self) {
        self.stop.cancel();
    }

    /// Blocks until `stop_consuming` is called or every bound queue is deleted.
    pub async fn start_consuming(&mut self) -> Result<(), PipelineError> {
        let mut merged: SelectAll<Pin<Box<dyn Stream<Item = (usize, Vec<u8>)> + Send>>> =
            SelectAll::new();
        let queues: Vec<String> = self.bindings.iter().map(|b| b.queue.clone()).collect();
        for (idx, queue) in queues.iter().enumerate() {
            let deliveries = self.channel.consume(queue).await?;
            merged.push(Box::pin(deliveries.map(move |payload| (idx, payload))));
        }

        let stop = self.stop.clone();
        tracing::info!(queues = self.bindings.len(), "consume loop started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    tracing::info!("consume loop stopped");
                    break;
                }
                next = merged.next() => match next {
                    Some((idx, payload)) => {
                        self.bindings[idx].handler.handle(Envelope::new(payload));
                    }
                    None => {
                        tracing::info!("all queues closed, consume loop exiting");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Consumes until stopped, then shuts down. Teardown runs even when the
    /// loop fails; the loop error wins over a teardown error.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        let consumed = self.start_consuming().await;
        let teardown = self.shutdown();
        consumed.and(teardown)
    }

    /// Removes the handler bound to `queue` and closes its outputs.
    pub fn unbind(&mut self, queue: &str) -> Result<(), PipelineError> {
        let Some(pos) = self.bindings.iter().position(|b| b.queue == queue) else {
            return Ok(());
        };
        let mut binding = self.bindings.remove(pos);
        tracing::info!(queue = %binding.queue, "handler unbound");
        binding.handler.close()
    }

    /// Stops the loop and tears down every handler, even when some fail.
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.stop.cancel();

        let mut failed = Vec::new();
        for mut binding in self.bindings.drain(..) {
            if let Err(e) = binding.handler.close() {
                tracing::error!(queue = %binding.queue, error = %e, "handler teardown failed");
                failed.push(binding.queue);
            } else {
                tracing::info!(queue = %binding.queue, "handler closed");
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Sink(format!(
                "teardown failed for queue(s): {}",
                failed.join(", ")
            )))
        }
    }
}
