use std::sync::Arc;

use chrono::Utc;
use pv_client::domain::MeterReading;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{broker::Publisher, pipeline::PipelineError};

pub const MIN_CONSUMPTION_W: f64 = 0.0;
pub const MAX_CONSUMPTION_W: f64 = 9_000.0;

const METER_ID_PREFIX: &str = "Meter ";

/// Hands out `Meter 0`, `Meter 1`, ... Owned by whoever creates meters, so
/// two generators never share a sequence.
#[derive(Debug, Default)]
pub struct MeterIdGenerator {
    next: u64,
}

impl MeterIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{METER_ID_PREFIX}{}", self.next);
        self.next += 1;
        id
    }
}

pub struct MeterFactory {
    ids: MeterIdGenerator,
}

impl MeterFactory {
    pub fn new(ids: MeterIdGenerator) -> Self {
        Self { ids }
    }

    pub async fn new_meter<P: Publisher>(
        &mut self,
        publisher: Arc<P>,
    ) -> Result<Meter<P>, PipelineError> {
        Meter::open(self.ids.next_id(), publisher).await
    }
}

/// A simulated consumption meter publishing to the queue named after its id.
///
/// Readings are uniform in `[MIN_CONSUMPTION_W, MAX_CONSUMPTION_W)`.
pub struct Meter<P> {
    meter_id: String,
    publisher: Arc<P>,
    rng: StdRng,
}

impl<P: Publisher> Meter<P> {
    /// Declares the meter's queue.
    pub async fn open(
        meter_id: impl Into<String>,
        publisher: Arc<P>,
    ) -> Result<Self, PipelineError> {
        let meter_id = meter_id.into();
        publisher.open_channel(&meter_id).await?;
        Ok(Self {
            meter_id,
            publisher,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn meter_id(&self) -> &str {
        &self.meter_id
    }

    pub fn read_consumption(&mut self) -> f64 {
        self.rng.gen_range(MIN_CONSUMPTION_W..MAX_CONSUMPTION_W)
    }

    /// Reads a value, stamps it with the current epoch second and publishes it.
    pub async fn send_consumption(&mut self) -> Result<MeterReading, PipelineError> {
        let reading = MeterReading::new(
            self.meter_id.clone(),
            self.read_consumption(),
            Utc::now().timestamp(),
        );
        self.publish(&reading).await?;
        Ok(reading)
    }

    pub async fn publish(&self, reading: &MeterReading) -> Result<(), PipelineError> {
        let payload = reading
            .to_json_bytes()
            .map_err(|e| PipelineError::Malformed(format!("failed to encode reading: {e}")))?;
        let text = String::from_utf8_lossy(&payload).into_owned();

        self.publisher.publish(&self.meter_id, payload).await?;

        metrics::counter!("meter_readings_published_total").increment(1);
        tracing::info!(meter_id = %self.meter_id, payload = %text, "message sent");
        Ok(())
    }

    /// Deletes the meter's queue.
    pub async fn close(self) -> Result<(), PipelineError> {
        self.publisher.delete_channel(&self.meter_id).await
    }
}
