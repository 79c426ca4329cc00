use std::time::SystemTime;

use pv_client::domain::OutputRecord;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The message channel endpoint cannot be reached or bound.
    #[error("connection error: {0}")]
    Connection(String),
    /// A delivered payload is not a valid meter reading.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// An output failed to persist or close.
    #[error("sink error: {0}")]
    Sink(String),
    #[error("channel error: {0}")]
    Channel(String),
}

/// A destination for aggregated records (console log, per-day CSV file, ...).
pub trait Output: Send {
    fn emit(&mut self, record: &OutputRecord) -> Result<(), PipelineError>;

    /// Flushes and releases any held resource. Called once on teardown.
    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Receives every payload delivered on the queue it is bound to.
///
/// Invoked synchronously from the consume loop, one delivery at a time.
pub trait MessageHandler: Send {
    fn handle(&mut self, delivery: Envelope<Vec<u8>>);

    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}
