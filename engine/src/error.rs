//! Error types for the copy engine.
//!
//! `EngineError` covers both run-level errors (which abort a run before any
//! transfer starts) and per-file causes carried inside
//! [`OperationOutcome::Failed`](crate::model::OperationOutcome::Failed).
//! Per-file errors never abort a run; the scheduler records them and moves on.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::checksums::ChecksumAlgorithm;

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source root does not exist or cannot be read
    #[error("source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source root exists but is a file (or something else)
    #[error("source is not a directory: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Destination root could not be created, or exists as a non-directory
    #[error("failed to create destination directory {}: {source}", path.display())]
    DestinationCreationFailed { path: PathBuf, source: io::Error },

    #[error("failed to copy {}: {source}", path.display())]
    CopyFailed { path: PathBuf, source: io::Error },

    #[error("failed to delete {}: {source}", path.display())]
    DeleteFailed { path: PathBuf, source: io::Error },

    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    #[error("invalid retry count {count}: must not exceed {max}")]
    InvalidRetryCount { count: u32, max: u32 },

    #[error("invalid size range: minimum {min} exceeds maximum {max}")]
    InvalidSizeRange { min: u64, max: u64 },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    /// The file is held busy by another process
    #[error("file is locked: {}", path.display())]
    FileLocked { path: PathBuf, source: io::Error },

    #[error("failed to enumerate {}: {source}", path.display())]
    Enumeration { path: PathBuf, source: walkdir::Error },

    /// Data was transferred but timestamps, permissions or xattrs could not be applied
    #[error("failed to copy attributes to {}: {source}", path.display())]
    AttributeCopyFailed { path: PathBuf, source: io::Error },

    #[error("{algorithm} checksum mismatch after copying {}", path.display())]
    VerificationFailed { path: PathBuf, algorithm: ChecksumAlgorithm },

    #[error("transfer cancelled: {}", path.display())]
    Cancelled { path: PathBuf },

    #[error("failed to read job file {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("failed to parse job file {}: {source}", path.display())]
    ConfigParse { path: PathBuf, source: serde_json::Error },

    #[error("failed to write job file {}: {source}", path.display())]
    ConfigWrite { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// Classify an I/O error raised while copying `path`.
    pub fn copy(path: &Path, err: io::Error) -> Self {
        Self::classify(path, err).unwrap_or_else(|err| Self::CopyFailed {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Classify an I/O error raised while deleting `path`.
    pub fn delete(path: &Path, err: io::Error) -> Self {
        Self::classify(path, err).unwrap_or_else(|err| Self::DeleteFailed {
            path: path.to_path_buf(),
            source: err,
        })
    }

    fn classify(path: &Path, err: io::Error) -> Result<Self, io::Error> {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Ok(Self::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            }),
            io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy => {
                Ok(Self::FileLocked {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
            _ => Err(err),
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DestinationCreationFailed { source, .. }
            | Self::CopyFailed { source, .. }
            | Self::DeleteFailed { source, .. }
            | Self::PermissionDenied { source, .. }
            | Self::FileLocked { source, .. }
            | Self::AttributeCopyFailed { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. } => source.raw_os_error(),
            Self::Enumeration { source, .. } => {
                source.io_error().and_then(io::Error::raw_os_error)
            }
            _ => None,
        }
    }

    /// True for errors that abort a run before any transfer starts.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceNotDirectory { .. }
                | Self::DestinationCreationFailed { .. }
                | Self::InvalidWorkerCount { .. }
                | Self::InvalidRetryCount { .. }
                | Self::InvalidSizeRange { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigWrite { .. }
        )
    }
}
