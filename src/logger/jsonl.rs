//! JSONL companion to the audit file: the same events, machine-readable.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::core::errors::{ReclaimError, Result};
use crate::logger::audit::audit_file_path;
use crate::logger::dual::LogSink;
use crate::logger::events::DecisionEvent;

#[derive(Serialize)]
struct JsonlRecord<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a DecisionEvent,
}

/// Append-only JSON-lines writer.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    file: File,
}

impl JsonlWriter {
    pub fn open(log_dir: &Path, started: &DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| ReclaimError::io(log_dir, e))?;
        let path = audit_file_path(log_dir, started, "jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ReclaimError::io(&path, e))?;
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serialize one event as a single JSON line (no trailing newline).
pub fn encode_line(stamp: &DateTime<Local>, event: &DecisionEvent) -> serde_json::Result<String> {
    serde_json::to_string(&JsonlRecord {
        ts: stamp.to_rfc3339_opts(SecondsFormat::Micros, false),
        event,
    })
}

impl LogSink for JsonlWriter {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write_event(&mut self, stamp: &DateTime<Local>, event: &DecisionEvent) -> io::Result<()> {
        let line = encode_line(stamp, event).map_err(io::Error::other)?;
        // One write per line keeps concurrent readers from seeing partial records.
        self.file.write_all(format!("{line}\n").as_bytes())?;
        self.file.flush()
    }
}
