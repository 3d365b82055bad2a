//! Line-oriented protocol event log
//!
//! Every frame sent or received is appended as one JSON object per line.
//! Other tooling parses these files, so the field names are fixed:
//!
//! ```text
//! {"timestamp":"2024-10-01T12:00:00.123456789+02:00","direction":"sent","type":"session.update","raw_json":{...}}
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Which way a logged frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub event_type: String,
    pub raw_json: Value,
}

/// Append-only JSON-lines log shared by all tasks
///
/// Writes are serialized by an internal mutex and flushed per entry. After
/// [`EventLog::close`] further entries are dropped silently.
#[derive(Debug)]
pub struct EventLog {
    writer: Mutex<Option<BufWriter<File>>>,
    path: Option<PathBuf>,
}

impl EventLog {
    /// Create `<dir>/chat_<YYYYmmdd_HHMMSS>.log`, creating `dir` if needed
    ///
    /// # Errors
    /// Returns an I/O error if the directory or file cannot be created
    pub fn create(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let name = format!("chat_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        Self::open(path)
    }

    /// Open (truncate) a log at an explicit path
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        info!(path = %path.display(), "Event log opened");

        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            path: Some(path),
        })
    }

    /// A log that discards everything
    pub fn disabled() -> Self {
        Self {
            writer: Mutex::new(None),
            path: None,
        }
    }

    /// Location of the log file, if logging to disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry
    ///
    /// Failures are reported through `tracing` and never returned: losing a
    /// diagnostic line must not interrupt the conversation.
    pub fn log(&self, direction: Direction, event_type: &str, raw_json: Value) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Nanos, false),
            direction,
            event_type: event_type.to_string(),
            raw_json,
        };

        let result = serde_json::to_writer(&mut *writer, &entry)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());

        if let Err(e) = result {
            warn!(error = %e, "Failed to write event log entry");
        }
    }

    /// Flush and close the file; later entries are ignored
    pub fn close(&self) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush event log");
            }
            info!("Event log closed");
        }
    }
}
