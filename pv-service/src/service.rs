//! The PV service: one instance per meter id.
//!
//! Each delivered reading is paired with this installation's simulated PV
//! output and handed to every output in registration order.

use std::time::SystemTime;

use pv_client::domain::OutputRecord;

use crate::{
    broker::{Consumer, Subscriber},
    pipeline::{Envelope, MessageHandler, Output, PipelineError},
    solar::{PowerSource, SimulatedPv},
    transform,
};

pub struct PvService {
    meter_id: String,
    pv: Box<dyn PowerSource>,
    outputs: Vec<Box<dyn Output>>,
}

impl PvService {
    /// Creates a service with freshly drawn solar parameters.
    pub fn new(meter_id: impl Into<String>, outputs: Vec<Box<dyn Output>>) -> Self {
        Self::with_power_source(meter_id, Box::new(SimulatedPv::random()), outputs)
    }

    pub fn with_power_source(
        meter_id: impl Into<String>,
        pv: Box<dyn PowerSource>,
        outputs: Vec<Box<dyn Output>>,
    ) -> Self {
        Self {
            meter_id: meter_id.into(),
            pv,
            outputs,
        }
    }

    pub fn meter_id(&self) -> &str {
        &self.meter_id
    }

    /// Subscribes this service to the queue named after its meter id.
    pub async fn bind<C>(self, consumer: &mut Consumer<C>) -> Result<(), PipelineError>
    where
        C: Subscriber + 'static,
    {
        let queue = self.meter_id.clone();
        consumer.bind_messages(queue, Box::new(self)).await
    }

    /// Decodes and aggregates one payload. Malformed payloads reach no output.
    pub fn process(&mut self, payload: &[u8]) -> Result<OutputRecord, PipelineError> {
        let reading = transform::decode_meter_reading(payload)?;
        let pv_power_kw = self.pv.power_kw(reading.time_s);
        let record = transform::aggregate(&self.meter_id, &reading, pv_power_kw);
        self.dispatch(&record);
        Ok(record)
    }

    /// Hands `record` to every output. A failing output does not stop the others.
    fn dispatch(&mut self, record: &OutputRecord) {
        for (idx, output) in self.outputs.iter_mut().enumerate() {
            match output.emit(record) {
                Ok(()) => {
                    metrics::counter!("pv_records_emitted_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("pv_sink_errors_total").increment(1);
                    tracing::error!(
                        meter_id = %self.meter_id,
                        output = idx,
                        error = %e,
                        "output failed to persist record"
                    );
                }
            }
        }
    }
}

impl MessageHandler for PvService {
    fn handle(&mut self, delivery: Envelope<Vec<u8>>) {
        metrics::counter!("pv_messages_received_total").increment(1);

        match self.process(&delivery.payload) {
            Ok(record) => {
                tracing::debug!(
                    meter_id = %self.meter_id,
                    time_s = record.time_s,
                    "reading processed"
                );
                if let Ok(dur) = SystemTime::now().duration_since(delivery.received_at) {
                    metrics::histogram!("pv_processing_latency_seconds").record(dur.as_secs_f64());
                }
            }
            Err(e) => {
                metrics::counter!("pv_malformed_messages_total").increment(1);
                tracing::warn!(meter_id = %self.meter_id, error = %e, "dropping message");
            }
        }
    }

    /// Closes every output, continuing past failures.
    fn close(&mut self) -> Result<(), PipelineError> {
        let mut failures = 0;
        for (idx, output) in self.outputs.iter_mut().enumerate() {
            if let Err(e) = output.close() {
                failures += 1;
                tracing::error!(
                    meter_id = %self.meter_id,
                    output = idx,
                    error = %e,
                    "output close failed"
                );
            }
        }

        if failures == 0 {
            Ok(())
        } else {
            Err(PipelineError::Sink(format!(
                "{failures} output(s) of '{}' failed to close",
                self.meter_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct ConstantPv(f64);

    impl PowerSource for ConstantPv {
        fn power_kw(&mut self, _time_s: i64) -> f64 {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<OutputRecord>>>);

    impl Output for Recording {
        fn emit(&mut self, record: &OutputRecord) -> Result<(), PipelineError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Failing;

    impl Output for Failing {
        fn emit(&mut self, _record: &OutputRecord) -> Result<(), PipelineError> {
            Err(PipelineError::Sink("disk full".to_string()))
        }

        fn close(&mut self) -> Result<(), PipelineError> {
            Err(PipelineError::Sink("already gone".to_string()))
        }
    }

    fn service(outputs: Vec<Box<dyn Output>>) -> PvService {
        PvService::with_power_source("Meter ID", Box::new(ConstantPv(2.5)), outputs)
    }

    #[test]
    fn reading_is_aggregated_and_forwarded() {
        let out = Recording::default();
        let mut svc = service(vec![Box::new(out.clone())]);

        svc.handle(Envelope::new(
            br#"{"meter_id": "Meter ID", "time_s": 124, "value": 84.35}"#.to_vec(),
        ));

        let records = out.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            OutputRecord {
                meter_id: "Meter ID".to_string(),
                time_s: 124,
                meter_power_value_w: 84.35,
                pv_power_value_kw: 2.5,
                sum_meter_pv_w: 2584.35,
            }
        );
    }

    #[test]
    fn malformed_payload_reaches_no_output() {
        let out = Recording::default();
        let mut svc = service(vec![Box::new(out.clone())]);

        svc.handle(Envelope::new(b"{\"meter_id\": 12".to_vec()));
        assert!(matches!(svc.process(b"[]"), Err(PipelineError::Malformed(_))));

        assert!(out.0.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_output_does_not_block_later_outputs() {
        let first = Recording::default();
        let last = Recording::default();
        let mut svc = service(vec![
            Box::new(first.clone()),
            Box::new(Failing),
            Box::new(last.clone()),
        ]);

        svc.handle(Envelope::new(
            br#"{"meter_id": "Meter ID", "time_s": 1, "value": 1.0}"#.to_vec(),
        ));

        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert_eq!(last.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_reports_failures_after_closing_everything() {
        let mut svc = service(vec![Box::new(Failing), Box::new(Recording::default())]);
        assert!(matches!(svc.close(), Err(PipelineError::Sink(_))));
    }
}
