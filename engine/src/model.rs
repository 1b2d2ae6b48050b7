//! Core data model for copy runs.
//!
//! This module defines the values that flow between the components:
//! - CandidateFile: a source file the enumerator decided must be copied
//! - OperationOutcome: the single result of one file or directory action
//! - SkipReason: why an action was not carried out

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::EngineError;

/// A source file selected for transfer.
///
/// `relative_path` is computed once, at enumeration time, against the
/// symlink-resolved source root. Destination paths and reconciliation
/// lookups are always built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Full source path
    pub source: PathBuf,

    /// Path relative to the resolved source root
    pub relative_path: PathBuf,

    /// File size in bytes at enumeration time
    pub size: u64,

    /// Source modification time at enumeration time
    pub modified: Option<SystemTime>,
}

impl CandidateFile {
    /// Destination path for this candidate under `destination_root`.
    pub fn destination_under(&self, destination_root: &Path) -> PathBuf {
        destination_root.join(&self.relative_path)
    }
}

/// Why an action was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Dry run; nothing was touched
    DryRun,
    /// Destination has the same size and modification time
    Identical,
    /// Destination is not older than the source (exclude-older)
    DestinationNotOlder,
    /// The run was cancelled before this file was dispatched
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DryRun => write!(f, "dry-run"),
            SkipReason::Identical => write!(f, "identical"),
            SkipReason::DestinationNotOlder => write!(f, "destination not older"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one attempted file or directory action.
#[derive(Debug)]
pub enum OperationOutcome {
    /// A file was copied (and made visible at `destination`)
    Copied {
        source: PathBuf,
        destination: PathBuf,
        bytes: u64,
    },
    /// A file was not copied
    Skipped {
        source: PathBuf,
        reason: SkipReason,
        bytes: u64,
    },
    /// A destination entry was removed during reconciliation
    Deleted { path: PathBuf, is_dir: bool },
    /// The action failed after all retries
    Failed { path: PathBuf, cause: EngineError },
    /// A destination directory was created
    DirectoryCreated { path: PathBuf },
}

impl OperationOutcome {
    /// The path this outcome is about.
    pub fn path(&self) -> &Path {
        match self {
            OperationOutcome::Copied { source, .. } => source,
            OperationOutcome::Skipped { source, .. } => source,
            OperationOutcome::Deleted { path, .. } => path,
            OperationOutcome::Failed { path, .. } => path,
            OperationOutcome::DirectoryCreated { path } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OperationOutcome::Failed { .. })
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Copied { source, bytes, .. } => {
                write!(f, "copied {} ({} bytes)", source.display(), bytes)
            }
            OperationOutcome::Skipped { source, reason, .. } => {
                write!(f, "skipped {} ({})", source.display(), reason)
            }
            OperationOutcome::Deleted { path, is_dir: true } => {
                write!(f, "deleted directory {}", path.display())
            }
            OperationOutcome::Deleted { path, is_dir: false } => {
                write!(f, "deleted {}", path.display())
            }
            OperationOutcome::Failed { path, cause } => {
                write!(f, "failed {}: {}", path.display(), cause)
            }
            OperationOutcome::DirectoryCreated { path } => {
                write!(f, "created directory {}", path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_uses_relative_path() {
        let candidate = CandidateFile {
            source: PathBuf::from("/data/src/a/b.txt"),
            relative_path: PathBuf::from("a/b.txt"),
            size: 3,
            modified: None,
        };
        assert_eq!(
            candidate.destination_under(Path::new("/backup/src")),
            PathBuf::from("/backup/src/a/b.txt")
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = OperationOutcome::Skipped {
            source: PathBuf::from("/s/x"),
            reason: SkipReason::DryRun,
            bytes: 0,
        };
        assert_eq!(outcome.to_string(), "skipped /s/x (dry-run)");
        assert!(!outcome.is_failure());
        assert_eq!(outcome.path(), Path::new("/s/x"));
    }
}
