pub mod broker;
pub mod clock;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod sinks;
pub mod solar;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, MessageHandler, Output, PipelineError};
pub use service::PvService;
