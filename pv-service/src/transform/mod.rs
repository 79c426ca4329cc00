use pv_client::domain::{MeterReading, OutputRecord};

use crate::pipeline::PipelineError;

/// Decodes a wire payload into a validated `MeterReading`.
pub fn decode_meter_reading(payload: &[u8]) -> Result<MeterReading, PipelineError> {
    let reading = MeterReading::from_json_slice(payload)
        .map_err(|e| PipelineError::Malformed(format!("invalid meter reading payload: {e}")))?;
    validate_meter_reading(reading)
}

/// Pure validation of a `MeterReading`.
///
/// Rules:
/// - value must be finite and non-negative (watts).
/// - meter_id must not be blank.
pub fn validate_meter_reading(reading: MeterReading) -> Result<MeterReading, PipelineError> {
    if !reading.value.is_finite() || reading.value < 0.0 {
        return Err(PipelineError::Malformed(format!(
            "value must be a non-negative number of watts, got {}",
            reading.value
        )));
    }

    if reading.meter_id.trim().is_empty() {
        return Err(PipelineError::Malformed("meter_id must not be empty".to_string()));
    }

    Ok(reading)
}

/// Pairs a reading with the PV output for the same instant.
///
/// `meter_id` is the id the service is bound to, which is also the queue name.
pub fn aggregate(meter_id: &str, reading: &MeterReading, pv_power_kw: f64) -> OutputRecord {
    OutputRecord {
        meter_id: meter_id.to_string(),
        time_s: reading.time_s,
        meter_power_value_w: reading.value,
        pv_power_value_kw: pv_power_kw,
        sum_meter_pv_w: pv_power_kw * 1_000.0 + reading.value,
    }
}
