//! Append-only text audit file, one per run.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Timelike};

use crate::core::errors::{ReclaimError, Result};
use crate::logger::dual::LogSink;
use crate::logger::events::DecisionEvent;

/// File-name prefix for audit files.
pub const AUDIT_PREFIX: &str = "profile-reclaim";

/// `[MM/DD/YY HH:MM:SS.fffffff]` with 100ns precision.
#[must_use]
pub fn format_timestamp(stamp: &DateTime<Local>) -> String {
    let ticks = stamp.nanosecond() % 1_000_000_000 / 100;
    format!("[{}.{ticks:07}]", stamp.format("%m/%d/%y %H:%M:%S"))
}

/// Audit file path for a run started at `started`.
#[must_use]
pub fn audit_file_path(log_dir: &Path, started: &DateTime<Local>, extension: &str) -> PathBuf {
    log_dir.join(format!(
        "{AUDIT_PREFIX}_{}.{extension}",
        started.format("%Y%m%d_%H%M%S")
    ))
}

/// Durable human-readable log. Opened in append mode and never truncated.
#[derive(Debug)]
pub struct AuditFile {
    path: PathBuf,
    file: File,
}

impl AuditFile {
    pub fn open(log_dir: &Path, started: &DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| ReclaimError::io(log_dir, e))?;
        let path = audit_file_path(log_dir, started, "log");
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

impl LogSink for AuditFile {
    fn name(&self) -> &'static str {
        "audit file"
    }

    fn write_event(&mut self, stamp: &DateTime<Local>, event: &DecisionEvent) -> io::Result<()> {
        writeln!(self.file, "{} {}", format_timestamp(stamp), event.message())?;
        self.file.sync_data()
    }
}
