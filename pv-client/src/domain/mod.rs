pub mod column;
pub mod meter_reading;
pub mod output_record;

pub use column::{Column, UnknownColumn};
pub use meter_reading::MeterReading;
pub use output_record::OutputRecord;
