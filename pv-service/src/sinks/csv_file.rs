use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate};
use pv_client::domain::{Column, OutputRecord};

use crate::{
    clock::{Clock, LocalClock},
    pipeline::{Output, PipelineError},
};

enum FileState {
    Unopened,
    Open {
        date: NaiveDate,
        path: PathBuf,
        writer: csv::Writer<File>,
    },
}

/// Appends records to one CSV file per local calendar day.
///
/// Files are named `<base>-<year>-<month>-<day>.csv` (no zero padding). The
/// header row is written only when the file is created; an existing file for
/// the same day is appended to as is. The current day's file stays open until
/// the day changes or the output is closed, and every row is flushed as soon
/// as it is written.
///
/// The file is not locked. An external process can modify or delete it while
/// it is open, with unspecified results.
pub struct CsvFileOutput<K = LocalClock> {
    base_name: PathBuf,
    columns: Vec<Column>,
    clock: K,
    state: FileState,
    /// File this output created whose header never reached the disk.
    header_owed: Option<PathBuf>,
}

impl CsvFileOutput<LocalClock> {
    pub fn new(base_name: impl Into<PathBuf>) -> Self {
        Self::with_columns(base_name, Column::ALL.to_vec())
    }

    pub fn with_columns(base_name: impl Into<PathBuf>, columns: Vec<Column>) -> Self {
        Self::with_clock(base_name, columns, LocalClock)
    }
}

impl<K: Clock> CsvFileOutput<K> {
    /// Opens today's file right away. If that fails the error is logged and
    /// the next `emit` retries.
    pub fn with_clock(base_name: impl Into<PathBuf>, columns: Vec<Column>, clock: K) -> Self {
        let mut out = Self {
            base_name: base_name.into(),
            columns,
            clock,
            state: FileState::Unopened,
            header_owed: None,
        };

        let today = out.clock.today();
        if let Err(e) = out.open(today) {
            tracing::warn!(
                error = %e,
                "csv output could not open today's file, will retry on next record"
            );
        }

        out
    }

    pub fn file_name_for(&self, date: NaiveDate) -> PathBuf {
        let mut name = OsString::from(self.base_name.as_os_str());
        name.push(format!("-{}-{}-{}.csv", date.year(), date.month(), date.day()));
        PathBuf::from(name)
    }

    /// Path of the file currently held open, if any.
    pub fn current_path(&self) -> Option<&Path> {
        match &self.state {
            FileState::Open { path, .. } => Some(path),
            FileState::Unopened => None,
        }
    }

    fn open(&mut self, date: NaiveDate) -> Result<(), PipelineError> {
        let path = self.file_name_for(date);
        let existed = path.is_file();
        let needs_header = !existed || self.header_owed.as_deref() == Some(path.as_path());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::Sink(format!("failed to open {}: {e}", path.display())))?;

        if needs_header {
            if let Err(e) = self.write_header(&mut file) {
                // leave an empty file behind, the next open writes the header again
                let _ = file.set_len(0);
                self.header_owed = Some(path.clone());
                return Err(PipelineError::Sink(format!(
                    "failed to write header to {}: {e}",
                    path.display()
                )));
            }
            self.header_owed = None;
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        tracing::info!(file = %path.display(), new_file = needs_header, "csv output opened");
        self.state = FileState::Open { date, path, writer };
        Ok(())
    }

    /// Writes the header row straight to `file`, bypassing any buffering.
    fn write_header(&self, file: &mut File) -> Result<(), csv::Error> {
        let mut header = csv::Writer::from_writer(Vec::new());
        header.write_record(self.columns.iter().map(|c| c.header()))?;
        let bytes = header
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), PipelineError> {
        match std::mem::replace(&mut self.state, FileState::Unopened) {
            FileState::Open { path, mut writer, .. } => {
                writer.flush().map_err(|e| {
                    PipelineError::Sink(format!("failed to flush {}: {e}", path.display()))
                })?;
                tracing::debug!(file = %path.display(), "csv output closed");
                Ok(())
            }
            FileState::Unopened => Ok(()),
        }
    }
}

impl<K: Clock> Output for CsvFileOutput<K> {
    fn emit(&mut self, record: &OutputRecord) -> Result<(), PipelineError> {
        let today = self.clock.today();

        let stale = match &self.state {
            FileState::Open { date, .. } => *date != today,
            FileState::Unopened => true,
        };

        if stale {
            if matches!(self.state, FileState::Open { .. }) {
                metrics::counter!("csv_file_rotations_total").increment(1);
                if let Err(e) = self.close_current() {
                    tracing::warn!(error = %e, "previous day's csv file did not close cleanly");
                }
            }
            self.open(today)?;
        }

        let FileState::Open { path, writer, .. } = &mut self.state else {
            return Err(PipelineError::Sink("csv output has no open file".to_string()));
        };

        writer
            .write_record(self.columns.iter().map(|c| c.render(record)))
            .and_then(|()| writer.flush().map_err(csv::Error::from))
            .map_err(|e| {
                PipelineError::Sink(format!("failed to append to {}: {e}", path.display()))
            })
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.close_current()
    }
}
