use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::OutputRecord;

/// One column of a tabular `OutputRecord` export.
///
/// Declaration order is the canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    MeterId,
    TimeS,
    MeterPowerValueW,
    PvPowerValueKw,
    SumMeterPvW,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown column '{0}'")]
pub struct UnknownColumn(pub String);

impl Column {
    pub const ALL: [Column; 5] = [
        Column::MeterId,
        Column::TimeS,
        Column::MeterPowerValueW,
        Column::PvPowerValueKw,
        Column::SumMeterPvW,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::MeterId => "meter_id",
            Column::TimeS => "time_s",
            Column::MeterPowerValueW => "meter_power_value_w",
            Column::PvPowerValueKw => "pv_power_value_kw",
            Column::SumMeterPvW => "sum_meter_pv_w",
        }
    }

    /// Renders this column's cell for `record`.
    ///
    /// Floats use the shortest representation that round-trips, so `2.5`
    /// stays `2.5` and `8745.65` stays `8745.65`.
    pub fn render(self, record: &OutputRecord) -> String {
        match self {
            Column::MeterId => record.meter_id.clone(),
            Column::TimeS => record.time_s.to_string(),
            Column::MeterPowerValueW => record.meter_power_value_w.to_string(),
            Column::PvPowerValueKw => record.pv_power_value_kw.to_string(),
            Column::SumMeterPvW => record.sum_meter_pv_w.to_string(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Column {
    type Err = UnknownColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.header() == trimmed)
            .ok_or_else(|| UnknownColumn(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> OutputRecord {
        OutputRecord {
            meter_id: "M".to_string(),
            time_s: 1547,
            meter_power_value_w: 8745.65,
            pv_power_value_kw: 2.5,
            sum_meter_pv_w: 11245.65,
        }
    }

    #[test]
    fn all_columns_follow_record_field_order() {
        let headers: Vec<_> = Column::ALL.iter().map(|c| c.header()).collect();
        assert_eq!(
            headers.join(","),
            "meter_id,time_s,meter_power_value_w,pv_power_value_kw,sum_meter_pv_w"
        );
    }

    #[test]
    fn renders_cells_without_padding() {
        let r = record();
        let cells: Vec<_> = Column::ALL.iter().map(|c| c.render(&r)).collect();
        assert_eq!(cells.join(","), "M,1547,8745.65,2.5,11245.65");
    }

    #[test]
    fn parses_header_names() {
        assert_eq!("pv_power_value_kw".parse::<Column>(), Ok(Column::PvPowerValueKw));
        assert_eq!(" time_s ".parse::<Column>(), Ok(Column::TimeS));
        assert_eq!(
            "kwh".parse::<Column>(),
            Err(UnknownColumn("kwh".to_string()))
        );
    }
}
