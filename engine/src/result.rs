//! Run-level result aggregation.
//!
//! A [`RunResult`] is created when a run starts, updated through
//! [`RunResult::record`] once per outcome by the coordinating thread, and
//! stamped with [`RunResult::finish`] exactly once at the end.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::OperationOutcome;

/// Errors listed individually in the summary; the rest are counted.
pub const MAX_DISPLAYED_ERRORS: usize = 10;

/// One failed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub path: PathBuf,
    pub message: String,
}

/// Counters and errors of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub files_copied: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_deleted: u64,
    pub dirs_created: u64,
    pub dirs_deleted: u64,
    pub bytes_copied: u64,
    pub bytes_skipped: u64,
    pub errors: Vec<RunError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RunResult {
    pub fn new() -> Self {
        RunResult {
            run_id: Uuid::new_v4(),
            files_copied: 0,
            files_skipped: 0,
            files_failed: 0,
            files_deleted: 0,
            dirs_created: 0,
            dirs_deleted: 0,
            bytes_copied: 0,
            bytes_skipped: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Apply one outcome to the counters.
    pub fn record(&mut self, outcome: OperationOutcome) {
        match outcome {
            OperationOutcome::Copied { bytes, .. } => {
                self.files_copied += 1;
                self.bytes_copied += bytes;
            }
            OperationOutcome::Skipped { bytes, .. } => {
                self.files_skipped += 1;
                self.bytes_skipped += bytes;
            }
            OperationOutcome::Deleted { is_dir: true, .. } => self.dirs_deleted += 1,
            OperationOutcome::Deleted { is_dir: false, .. } => self.files_deleted += 1,
            OperationOutcome::Failed { path, cause } => {
                self.files_failed += 1;
                self.errors.push(RunError {
                    path,
                    message: cause.to_string(),
                });
            }
            OperationOutcome::DirectoryCreated { .. } => self.dirs_created += 1,
        }
    }

    /// Stamp the end time. Later calls keep the first stamp.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn total_files(&self) -> u64 {
        self.files_copied + self.files_skipped + self.files_failed
    }

    /// Elapsed time, up to now if the run is still going.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Copied bytes per second.
    pub fn throughput(&self) -> f64 {
        let millis = self.duration().num_milliseconds();
        if millis <= 0 {
            return 0.0;
        }
        self.bytes_copied as f64 * 1000.0 / millis as f64
    }

    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }

    /// Render a human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "", "Total", "Copied", "Skipped", "Failed", "Extras"
        );
        // Directories are only created or deleted, never skipped or failed.
        let _ = writeln!(
            out,
            "{:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Dirs:", "", self.dirs_created, "", "", self.dirs_deleted
        );
        let _ = writeln!(
            out,
            "{:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Files:",
            self.total_files(),
            self.files_copied,
            self.files_skipped,
            self.files_failed,
            self.files_deleted
        );
        let _ = writeln!(
            out,
            "{:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Bytes:",
            format_bytes(self.bytes_copied + self.bytes_skipped),
            format_bytes(self.bytes_copied),
            format_bytes(self.bytes_skipped),
            "",
            ""
        );
        let _ = writeln!(out, "Elapsed: {}", format_duration(self.duration()));
        let _ = writeln!(out, "Speed: {}/s", format_bytes(self.throughput() as u64));

        if !self.errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Errors:");
            for error in self.errors.iter().take(MAX_DISPLAYED_ERRORS) {
                let _ = writeln!(out, "  {}: {}", error.path.display(), error.message);
            }
            if self.errors.len() > MAX_DISPLAYED_ERRORS {
                let _ = writeln!(out, "  ... and {} more", self.errors.len() - MAX_DISPLAYED_ERRORS);
            }
        }
        out
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

pub fn format_duration(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
