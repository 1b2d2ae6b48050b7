//! Destination reconciliation for mirror and purge runs.
//!
//! Every destination entry is mapped back to the source through its
//! relative path and looked up in the [`SourceIndex`] built during
//! enumeration. Entries with no source counterpart are removed: files
//! first, then directories deepest first. A directory with no counterpart is
//! removed as a whole and its contents are not visited.

use std::path::PathBuf;

use crate::config::JobConfig;
use crate::fs_ops::{self, Filesystem};
use crate::model::{OperationOutcome, SkipReason};
use crate::scan::SourceIndex;
use crate::walk::{self, Visit};

/// Remove destination entries that the scan did not see at the source.
///
/// Subtrees the scan pruned (excluded, hidden or unreadable) are left alone.
/// Outcomes are handed to `record`. File deletions that fail are recorded as
/// failures; directory deletions that fail are logged and otherwise ignored.
pub fn reconcile<F>(
    config: &JobConfig,
    source: &SourceIndex,
    filesystem: &dyn Filesystem,
    mut record: F,
) where
    F: FnMut(OperationOutcome),
{
    let destination = config.destination.as_path();
    if !destination.is_dir() {
        tracing::debug!("destination {} absent; nothing to reconcile", destination.display());
        return;
    }

    let mut extra_files: Vec<(PathBuf, u64)> = Vec::new();
    let mut extra_dirs: Vec<PathBuf> = Vec::new();

    let walked = walk::walk(destination, config.recursive, |entry| {
        let relative = match entry.path().strip_prefix(destination) {
            Ok(relative) => relative,
            Err(_) => return Visit::Continue,
        };
        if source.is_pruned(relative) {
            return Visit::SkipSubtree;
        }
        if source.contains(relative) {
            return Visit::Continue;
        }

        if entry.file_type().is_dir() {
            extra_dirs.push(entry.path().to_path_buf());
            Visit::SkipSubtree
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            extra_files.push((entry.path().to_path_buf(), size));
            Visit::Continue
        }
    });
    if let Err(e) = walked {
        tracing::warn!("reconciliation aborted: {}", e);
        return;
    }

    tracing::info!(
        "{} extra files and {} extra directories at destination",
        extra_files.len(),
        extra_dirs.len()
    );

    let retry = config.retry_policy();
    for (path, size) in extra_files {
        if config.dry_run {
            record(OperationOutcome::Skipped {
                source: path,
                reason: SkipReason::DryRun,
                bytes: size,
            });
            continue;
        }
        match fs_ops::remove_file_with_retry(filesystem, &path, retry) {
            Ok(()) => record(OperationOutcome::Deleted { path, is_dir: false }),
            Err(cause) => record(OperationOutcome::Failed { path, cause }),
        }
    }

    for dir in extra_dirs.into_iter().rev() {
        if config.dry_run {
            tracing::info!("would delete directory {}", dir.display());
            continue;
        }
        match fs_ops::remove_dir_tree(filesystem, &dir) {
            Ok(()) => record(OperationOutcome::Deleted { path: dir, is_dir: true }),
            Err(e) => tracing::warn!("could not delete extra directory: {}", e),
        }
    }
}
