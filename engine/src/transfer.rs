//! Single-file transfer.
//!
//! A [`Transfer`] copies one candidate to its destination path:
//! - Small files with no partial artifact use the native whole-file copy
//! - Everything else streams in fixed-size chunks into `<dest>.mcopy-partial`,
//!   resuming from an existing shorter artifact when resume is enabled
//! - The artifact is synced and renamed over the destination only once it
//!   holds the full source size
//! - Attributes (and optional checksum verification) follow the rename; a
//!   failure there fails the attempt
//!
//! Each attempt is retried per the job's retry policy.

use std::cmp;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crate::checksums::{self, ChecksumAlgorithm};
use crate::config::{AttributeFlags, JobConfig, RetryPolicy};
use crate::error::EngineError;
use crate::fs_ops::{self, Filesystem};
use crate::job::CancelToken;
use crate::model::{CandidateFile, OperationOutcome, SkipReason};
use crate::progress::ProgressCallback;

/// Bytes read and written per streaming step.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Files below this size (with no partial artifact) are copied whole.
pub const SMALL_FILE_THRESHOLD: u64 = 2 * CHUNK_SIZE;

/// Progress of one in-flight file. Owned by the transfer executing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferState {
    pub written: u64,
    pub total: u64,
    pub attempt: u32,
}

/// What a transfer did: its outcome plus a parent directory it created.
#[derive(Debug)]
pub struct TransferReport {
    pub directory_created: Option<PathBuf>,
    pub outcome: OperationOutcome,
}

/// Copies single files according to a job's options.
pub struct Transfer<'a> {
    fs: &'a dyn Filesystem,
    progress: &'a dyn ProgressCallback,
    cancel: &'a CancelToken,
    retry: RetryPolicy,
    attributes: AttributeFlags,
    resume: bool,
    dry_run: bool,
    move_source: bool,
    verify: Option<ChecksumAlgorithm>,
}

impl<'a> Transfer<'a> {
    pub fn new(
        config: &JobConfig,
        fs: &'a dyn Filesystem,
        progress: &'a dyn ProgressCallback,
        cancel: &'a CancelToken,
    ) -> Self {
        Transfer {
            fs,
            progress,
            cancel,
            retry: config.retry_policy(),
            attributes: config.attribute_flags(),
            resume: config.resume,
            dry_run: config.dry_run,
            move_source: config.move_files,
            verify: config.verify,
        }
    }

    /// Copy `candidate` to `destination`, retrying on failure.
    pub fn copy(&self, candidate: &CandidateFile, destination: &Path) -> TransferReport {
        let source = &candidate.source;

        if self.dry_run {
            return TransferReport {
                directory_created: None,
                outcome: OperationOutcome::Skipped {
                    source: source.clone(),
                    reason: SkipReason::DryRun,
                    bytes: candidate.size,
                },
            };
        }

        let directory_created = match fs_ops::ensure_parent_dir_exists(destination) {
            Ok(created) => created,
            Err(cause) => {
                return TransferReport {
                    directory_created: None,
                    outcome: OperationOutcome::Failed {
                        path: source.clone(),
                        cause,
                    },
                };
            }
        };

        let mut state = TransferState {
            written: 0,
            total: candidate.size,
            attempt: 0,
        };

        let result = loop {
            state.attempt += 1;
            match self.attempt(source, destination, &mut state) {
                Ok(()) => break Ok(()),
                Err(e @ EngineError::Cancelled { .. }) => break Err(e),
                Err(e) if state.attempt >= self.retry.attempts || self.cancel.is_cancelled() => {
                    break Err(e)
                }
                Err(e) => {
                    tracing::warn!(
                        "copy of {} failed (attempt {}/{}), retrying in {:?}: {}",
                        source.display(),
                        state.attempt,
                        self.retry.attempts,
                        self.retry.wait,
                        e
                    );
                    thread::sleep(self.retry.wait);
                }
            }
        };

        let outcome = match result {
            Ok(()) => {
                tracing::debug!("copied {} ({} bytes)", source.display(), state.total);
                if self.move_source {
                    // The copy stands even if the source cannot be removed.
                    if let Err(e) = fs_ops::remove_file_with_retry(self.fs, source, self.retry) {
                        tracing::warn!("moved file copied but source not removed: {}", e);
                    }
                }
                OperationOutcome::Copied {
                    source: source.clone(),
                    destination: destination.to_path_buf(),
                    bytes: state.total,
                }
            }
            Err(cause) => {
                tracing::debug!("giving up on {}: {}", source.display(), cause);
                OperationOutcome::Failed {
                    path: source.clone(),
                    cause,
                }
            }
        };

        TransferReport {
            directory_created,
            outcome,
        }
    }

    /// One full attempt: data, rename, attributes, verification.
    fn attempt(&self, source: &Path, destination: &Path, state: &mut TransferState) -> Result<(), EngineError> {
        let total = fs::metadata(source).map_err(|e| EngineError::copy(source, e))?.len();
        state.total = total;

        let partial = fs_ops::partial_path(destination);
        state.written = self.resume_offset(&partial, total)?;

        if state.written == 0 && total < SMALL_FILE_THRESHOLD {
            let copied = self
                .fs
                .copy_file(source, &partial)
                .map_err(|e| EngineError::copy(source, e))?;
            File::open(&partial)
                .and_then(|f| f.sync_all())
                .map_err(|e| EngineError::copy(&partial, e))?;
            state.written = copied;
            state.total = copied;
            self.progress.on_file_progress(source, copied, copied);
        } else {
            self.stream(source, &partial, state)?;
        }

        self.commit(&partial, destination)?;

        if self.attributes.any() {
            self.fs
                .copy_attributes(source, destination, self.attributes)
                .map_err(|e| EngineError::AttributeCopyFailed {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
        }

        if let Some(algorithm) = self.verify {
            let matches = checksums::files_match(source, destination, algorithm)
                .map_err(|e| EngineError::copy(destination, e))?;
            if !matches {
                return Err(EngineError::VerificationFailed {
                    path: destination.to_path_buf(),
                    algorithm,
                });
            }
        }

        Ok(())
    }

    /// Offset to continue from, discarding an artifact that cannot be resumed.
    fn resume_offset(&self, partial: &Path, total: u64) -> Result<u64, EngineError> {
        match fs::symlink_metadata(partial) {
            Ok(meta) if self.resume && meta.is_file() && meta.len() < total => {
                if meta.len() > 0 {
                    tracing::debug!("resuming {} at byte {}", partial.display(), meta.len());
                }
                Ok(meta.len())
            }
            Ok(_) => {
                tracing::debug!("discarding stale partial artifact {}", partial.display());
                fs::remove_file(partial).map_err(|e| EngineError::copy(partial, e))?;
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(EngineError::copy(partial, e)),
        }
    }

    /// Append chunks from `state.written` until the artifact holds `state.total` bytes.
    fn stream(&self, source: &Path, partial: &Path, state: &mut TransferState) -> Result<(), EngineError> {
        let mut reader = self.fs.open_read(source).map_err(|e| EngineError::copy(source, e))?;
        if state.written > 0 {
            reader
                .seek(SeekFrom::Start(state.written))
                .map_err(|e| EngineError::copy(source, e))?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if state.written > 0 {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut writer = options.open(partial).map_err(|e| EngineError::copy(partial, e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE as usize];
        while state.written < state.total {
            if self.cancel.is_cancelled() {
                // Keep what is on disk so a later run can resume.
                if let Err(e) = writer.sync_all() {
                    tracing::warn!("could not sync {} after cancel: {}", partial.display(), e);
                }
                return Err(EngineError::Cancelled {
                    path: source.to_path_buf(),
                });
            }

            let want = cmp::min(CHUNK_SIZE, state.total - state.written) as usize;
            let n = read_chunk(&mut reader, &mut buffer[..want]).map_err(|e| EngineError::copy(source, e))?;
            if n == 0 {
                return Err(EngineError::CopyFailed {
                    path: source.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "source shrank during transfer"),
                });
            }

            writer
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::copy(partial, e))?;
            state.written += n as u64;
            self.progress.on_file_progress(source, state.written, state.total);
        }

        writer.sync_all().map_err(|e| EngineError::copy(partial, e))
    }

    /// Make the finished artifact visible under its final name.
    fn commit(&self, partial: &Path, destination: &Path) -> Result<(), EngineError> {
        match fs::symlink_metadata(destination) {
            Ok(meta) if !meta.is_dir() => {
                fs::remove_file(destination).map_err(|e| EngineError::copy(destination, e))?;
            }
            _ => {}
        }
        fs::rename(partial, destination).map_err(|e| EngineError::copy(destination, e))
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
