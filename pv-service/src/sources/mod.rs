pub mod meter;

pub use meter::{Meter, MeterFactory, MeterIdGenerator, MAX_CONSUMPTION_W, MIN_CONSUMPTION_W};
