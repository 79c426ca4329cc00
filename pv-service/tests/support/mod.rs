#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use pv_client::domain::OutputRecord;
use pv_service::{solar::PowerSource, Output, PipelineError};
use tokio_util::sync::CancellationToken;

pub struct ConstantPv(pub f64);

impl PowerSource for ConstantPv {
    fn power_kw(&mut self, _time_s: i64) -> f64 {
        self.0
    }
}

#[derive(Clone, Default)]
pub struct Recording {
    records: Arc<Mutex<Vec<OutputRecord>>>,
    closed: Arc<AtomicBool>,
}

impl Recording {
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Output for Recording {
    fn emit(&mut self, record: &OutputRecord) -> Result<(), PipelineError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every call.
pub struct Broken;

impl Output for Broken {
    fn emit(&mut self, _record: &OutputRecord) -> Result<(), PipelineError> {
        Err(PipelineError::Sink("permission denied".to_string()))
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        Err(PipelineError::Sink("file vanished".to_string()))
    }
}

/// Stops the consume loop once `total` records have been emitted across all clones.
#[derive(Clone)]
pub struct StopAfter {
    remaining: Arc<AtomicUsize>,
    token: CancellationToken,
}

impl StopAfter {
    pub fn new(total: usize, token: CancellationToken) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(total)),
            token,
        }
    }
}

impl Output for StopAfter {
    fn emit(&mut self, _record: &OutputRecord) -> Result<(), PipelineError> {
        let before = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if before <= 1 {
            self.token.cancel();
        }
        Ok(())
    }
}
