use serde::{Deserialize, Serialize};

/// A single consumption sample published by a meter.
///
/// Wire format (JSON): `{"meter_id": "<string>", "value": <float>, "time_s": <integer>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub meter_id: String,
    /// Consumption in watts.
    pub value: f64,
    /// Epoch seconds.
    pub time_s: i64,
}

impl MeterReading {
    pub fn new(meter_id: impl Into<String>, value: f64, time_s: i64) -> Self {
        Self {
            meter_id: meter_id.into(),
            value,
            time_s,
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
