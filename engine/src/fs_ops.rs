//! Filesystem operations module.
//!
//! This module provides the low-level operations transfers and reconciliation
//! are built on:
//! - The [`Filesystem`] seam (open, native copy, attribute propagation, deletes)
//! - Parent directory creation
//! - Deletion with retry
//! - Partial artifact naming

use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;

use filetime::FileTime;

use crate::config::{AttributeFlags, RetryPolicy};
use crate::error::EngineError;

/// Suffix appended to a destination path while its transfer is in flight.
///
/// Source files carrying this suffix are never enumerated, so an artifact
/// cannot collide with another file's destination.
pub const PARTIAL_SUFFIX: &str = ".mcopy-partial";

/// Filesystem operations a transfer depends on.
///
/// `LocalFs` is the real implementation; tests wrap it to inject failures.
pub trait Filesystem: Send + Sync {
    /// Open a source file for reading.
    fn open_read(&self, path: &Path) -> io::Result<File>;

    /// Copy a whole file's data with the platform's native primitive.
    ///
    /// Only bytes are copied; the destination gets default permissions.
    fn copy_file(&self, source: &Path, destination: &Path) -> io::Result<u64>;

    /// Carry the selected attributes from `source` to `destination`.
    fn copy_attributes(&self, source: &Path, destination: &Path, flags: AttributeFlags) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// The local POSIX filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn copy_file(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        // fs::copy would also carry the mode bits; those belong to copy_attributes.
        let mut reader = File::open(source)?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(destination)?;
        io::copy(&mut reader, &mut writer)
    }

    fn copy_attributes(&self, source: &Path, destination: &Path, flags: AttributeFlags) -> io::Result<()> {
        let metadata = fs::metadata(source)?;

        // A read-only mode would block setxattr, so xattrs go first.
        if flags.xattrs {
            copy_xattrs(source, destination)?;
        }
        if flags.permissions {
            let mode = metadata.permissions().mode();
            fs::set_permissions(destination, fs::Permissions::from_mode(mode))?;
        }
        if flags.timestamps {
            let atime = FileTime::from_last_access_time(&metadata);
            let mtime = FileTime::from_last_modification_time(&metadata);
            filetime::set_file_times(destination, atime, mtime)?;
        }
        Ok(())
    }
}

/// Copy every readable extended attribute from `source` to `destination`.
fn copy_xattrs(source: &Path, destination: &Path) -> io::Result<()> {
    let names: Vec<OsString> = xattr::list(source)?.collect();
    for name in names {
        if let Some(value) = xattr::get(source, &name)? {
            xattr::set(destination, &name, &value)?;
        }
    }
    Ok(())
}

/// Path of the partial artifact for `destination`.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Whether a file name is a partial artifact name.
pub fn is_partial_name(name: &OsStr) -> bool {
    name.as_encoded_bytes().ends_with(PARTIAL_SUFFIX.as_bytes())
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// Returns the parent path when this call created it. When several workers
/// race to create the same directory, only one of them reports it.
///
/// # Errors
/// Returns EngineError if directory creation fails or the parent exists as
/// something other than a directory.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<Option<PathBuf>, EngineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(None),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(None),
        Ok(_) => Err(EngineError::CopyFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_dir_reporting(parent),
        Err(e) => Err(EngineError::copy(parent, e)),
    }
}

/// Create `dir` (and its ancestors); `Some(dir)` if this call created it.
pub fn create_dir_reporting(dir: &Path) -> Result<Option<PathBuf>, EngineError> {
    if let Some(grandparent) = dir.parent() {
        if !grandparent.as_os_str().is_empty() {
            fs::create_dir_all(grandparent).map_err(|e| EngineError::copy(grandparent, e))?;
        }
    }
    match fs::create_dir(dir) {
        Ok(()) => Ok(Some(dir.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(None),
        Err(e) => Err(EngineError::copy(dir, e)),
    }
}

/// Remove a file, retrying per `policy`. A file that is already gone counts
/// as removed.
pub fn remove_file_with_retry(
    filesystem: &dyn Filesystem,
    path: &Path,
    policy: RetryPolicy,
) -> Result<(), EngineError> {
    let mut attempt = 1;
    loop {
        match filesystem.remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt >= policy.attempts => return Err(EngineError::delete(path, e)),
            Err(e) => {
                tracing::warn!(
                    "delete of {} failed (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    policy.attempts,
                    e
                );
                attempt += 1;
                thread::sleep(policy.wait);
            }
        }
    }
}

/// Remove a directory tree. A directory that is already gone counts as removed.
pub fn remove_dir_tree(filesystem: &dyn Filesystem, path: &Path) -> Result<(), EngineError> {
    match filesystem.remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::delete(path, e)),
    }
}
