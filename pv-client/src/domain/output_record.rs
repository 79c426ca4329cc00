use serde::{Deserialize, Serialize};

/// A meter reading paired with the simulated PV output for the same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub meter_id: String,
    pub time_s: i64,
    pub meter_power_value_w: f64,
    pub pv_power_value_kw: f64,
    pub sum_meter_pv_w: f64,
}
