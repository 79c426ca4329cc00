//! Record types shared by the meter (producer) and the PV service (consumer).

pub mod domain;

pub use domain::{Column, MeterReading, OutputRecord, UnknownColumn};
