pub mod csv_file;
pub mod logger;

pub use csv_file::CsvFileOutput;
pub use logger::LoggerOutput;

use crate::{config::PvServiceConfig, pipeline::Output};

/// Outputs for one meter as enabled in `cfg`: the logger first, then the
/// per-day CSV file `<output_dir>/<meter_id>-Y-M-D.csv`.
pub fn build_outputs(cfg: &PvServiceConfig, meter_id: &str) -> Vec<Box<dyn Output>> {
    let mut outputs: Vec<Box<dyn Output>> = Vec::new();

    if cfg.logger_enabled {
        outputs.push(Box::new(LoggerOutput));
    }

    if cfg.csv_enabled {
        outputs.push(Box::new(CsvFileOutput::with_columns(
            cfg.output_dir.join(meter_id),
            cfg.columns.clone(),
        )));
    }

    outputs
}
