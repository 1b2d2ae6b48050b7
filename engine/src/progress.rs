//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the copy
//! engine from whatever renders progress (CLI status lines, log files, tests).
//!
//! Threading: `on_file_started`, `on_file_progress` and `on_file_finished` are
//! called from worker threads and must return quickly. Every other method is
//! called only from the coordinating thread.

use std::path::Path;

use crate::model::{CandidateFile, OperationOutcome};
use crate::result::RunResult;

/// Receives events during a copy run. All methods default to no-ops.
pub trait ProgressCallback: Send + Sync {
    /// Called periodically while the source tree is enumerated.
    fn on_scan_progress(&self, _scanned: u64, _found: u64) {}

    /// Called when a worker picks up a file.
    fn on_file_started(&self, _candidate: &CandidateFile) {}

    /// Called after every chunk written for `path`.
    fn on_file_progress(&self, _path: &Path, _written: u64, _total: u64) {}

    /// Called by the worker once the transfer of `candidate` has returned,
    /// before its outcome reaches the coordinator.
    fn on_file_finished(&self, _candidate: &CandidateFile) {}

    /// Called once per outcome, in completion order.
    fn on_outcome(&self, _outcome: &OperationOutcome) {}

    /// Called once, after the run result has been finalized.
    fn on_run_completed(&self, _result: &RunResult) {}
}

/// A callback that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {}
