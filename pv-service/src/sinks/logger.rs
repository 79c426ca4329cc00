use pv_client::domain::OutputRecord;

use crate::pipeline::{Output, PipelineError};

/// Logs each record as an info event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerOutput;

impl Output for LoggerOutput {
    fn emit(&mut self, record: &OutputRecord) -> Result<(), PipelineError> {
        tracing::info!(
            meter_id = %record.meter_id,
            time_s = record.time_s,
            meter_power_value_w = record.meter_power_value_w,
            pv_power_value_kw = record.pv_power_value_kw,
            sum_meter_pv_w = record.sum_meter_pv_w,
            "pv record"
        );
        Ok(())
    }
}
