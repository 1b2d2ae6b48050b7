//! Job configuration.
//!
//! A [`JobConfig`] describes one copy run. It can be built in code, loaded
//! from a JSON job file, or populated by a front end. The engine only accepts
//! a config that went through [`JobConfig::validate`]; after that it is never
//! mutated.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;

/// Upper bound on concurrently active transfers
pub const MAX_WORKERS: usize = 128;

/// Upper bound on configured retries
pub const MAX_RETRY_COUNT: u32 = 1_000_000;

/// Describes one copy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Root source directory
    pub source: PathBuf,

    /// Root destination directory (created if absent)
    pub destination: PathBuf,

    /// Descend into subdirectories
    pub recursive: bool,

    /// Recreate source directories at the destination even when empty
    pub include_empty_dirs: bool,

    /// Copy recursively and delete destination entries absent from source
    pub mirror: bool,

    /// Delete destination entries absent from source
    pub purge: bool,

    /// Skip files whose destination copy is not older than the source
    pub exclude_older: bool,

    /// Never delete destination-only entries, even with mirror/purge
    pub exclude_extra: bool,

    /// Copy even when size and modification time match
    pub force_copy_identical: bool,

    /// Number of attempts per file (0 is treated as 1)
    pub retry_count: u32,

    /// Wait between attempts, in seconds
    pub retry_wait_secs: u64,

    /// Worker pool width
    pub threads: usize,

    /// Resume from a partial artifact left by an interrupted transfer
    pub resume: bool,

    /// File name globs to include (empty means everything)
    pub include_files: Vec<String>,

    /// File name globs to exclude
    pub exclude_files: Vec<String>,

    /// Directory name globs whose whole subtree is excluded
    pub exclude_dirs: Vec<String>,

    /// Skip entries whose name starts with a dot
    pub skip_hidden: bool,

    pub min_size: Option<u64>,
    pub max_size: Option<u64>,

    pub copy_timestamps: bool,
    pub copy_permissions: bool,
    pub copy_xattrs: bool,

    /// Delete source files after a successful copy
    pub move_files: bool,

    /// Like `move_files`, and also remove source directories left empty
    pub move_all: bool,

    /// Report what would happen without touching the filesystem
    pub dry_run: bool,

    /// Compare checksums of source and destination after each copy
    pub verify: Option<ChecksumAlgorithm>,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            recursive: false,
            include_empty_dirs: false,
            mirror: false,
            purge: false,
            exclude_older: false,
            exclude_extra: false,
            force_copy_identical: false,
            retry_count: 3,
            retry_wait_secs: 5,
            threads: 8,
            resume: true,
            include_files: Vec::new(),
            exclude_files: Vec::new(),
            exclude_dirs: Vec::new(),
            skip_hidden: false,
            min_size: None,
            max_size: None,
            copy_timestamps: true,
            copy_permissions: false,
            copy_xattrs: false,
            move_files: false,
            move_all: false,
            dry_run: false,
            verify: None,
        }
    }
}

/// Which attributes to carry from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFlags {
    pub timestamps: bool,
    pub permissions: bool,
    pub xattrs: bool,
}

impl AttributeFlags {
    pub fn any(&self) -> bool {
        self.timestamps || self.permissions || self.xattrs
    }
}

/// Attempts and backoff for one file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl JobConfig {
    /// Start a config for `source` → `destination` with default options.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        JobConfig {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Load a job from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write this job to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, content).map_err(|e| EngineError::ConfigWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check the job and resolve implied flags.
    ///
    /// Mirror implies recursion with empty directories; move-all implies
    /// moving files.
    pub fn validate(mut self) -> Result<Self, EngineError> {
        match fs::metadata(&self.source) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(EngineError::SourceNotDirectory { path: self.source });
            }
            Ok(_) => {}
            Err(_) => return Err(EngineError::SourceNotFound { path: self.source }),
        }

        if self.threads == 0 || self.threads > MAX_WORKERS {
            return Err(EngineError::InvalidWorkerCount {
                count: self.threads,
                max: MAX_WORKERS,
            });
        }

        if self.retry_count > MAX_RETRY_COUNT {
            return Err(EngineError::InvalidRetryCount {
                count: self.retry_count,
                max: MAX_RETRY_COUNT,
            });
        }

        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(EngineError::InvalidSizeRange { min, max });
            }
        }

        if self.mirror {
            self.recursive = true;
            self.include_empty_dirs = true;
        }
        if self.move_all {
            self.move_files = true;
        }

        Ok(self)
    }

    pub fn attribute_flags(&self) -> AttributeFlags {
        AttributeFlags {
            timestamps: self.copy_timestamps,
            permissions: self.copy_permissions,
            xattrs: self.copy_xattrs,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_count.max(1),
            wait: Duration::from_secs(self.retry_wait_secs),
        }
    }

    /// Whether the destination is reconciled after the copy pass.
    pub fn reconcile_enabled(&self) -> bool {
        (self.mirror || self.purge) && !self.exclude_extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = JobConfig::new(temp_dir.path().join("nonexistent"), temp_dir.path().join("dst"));

        let result = config.validate();
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_validate_file_as_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("file.txt");
        fs::write(&src, b"x").expect("Failed to create file");

        let result = JobConfig::new(&src, temp_dir.path().join("dst")).validate();
        assert!(matches!(result, Err(EngineError::SourceNotDirectory { .. })));
    }

    #[test]
    fn test_validate_worker_count() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = JobConfig::new(temp_dir.path(), temp_dir.path().join("dst"));
        config.threads = 0;
        assert!(matches!(
            config.clone().validate(),
            Err(EngineError::InvalidWorkerCount { count: 0, .. })
        ));

        config.threads = MAX_WORKERS + 1;
        assert!(matches!(config.validate(), Err(EngineError::InvalidWorkerCount { .. })));
    }

    #[test]
    fn test_validate_retry_count() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = JobConfig::new(temp_dir.path(), temp_dir.path().join("dst"));
        config.retry_count = MAX_RETRY_COUNT + 1;
        assert!(matches!(config.validate(), Err(EngineError::InvalidRetryCount { .. })));
    }

    #[test]
    fn test_validate_size_range() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = JobConfig::new(temp_dir.path(), temp_dir.path().join("dst"));
        config.min_size = Some(10);
        config.max_size = Some(5);
        assert!(matches!(config.validate(), Err(EngineError::InvalidSizeRange { min: 10, max: 5 })));
    }

    #[test]
    fn test_mirror_implies_recursion() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = JobConfig::new(temp_dir.path(), temp_dir.path().join("dst"));
        config.mirror = true;
        config.move_all = true;

        let config = config.validate().expect("valid config");
        assert!(config.recursive);
        assert!(config.include_empty_dirs);
        assert!(config.move_files);
        assert!(config.reconcile_enabled());
    }

    #[test]
    fn test_exclude_extra_disables_reconcile() {
        let mut config = JobConfig::new("/a", "/b");
        config.purge = true;
        assert!(config.reconcile_enabled());
        config.exclude_extra = true;
        assert!(!config.reconcile_enabled());
    }

    #[test]
    fn test_retry_policy_attempts_at_least_once() {
        let mut config = JobConfig::new("/a", "/b");
        config.retry_count = 0;
        config.retry_wait_secs = 2;
        let policy = config.retry_policy();
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.wait, Duration::from_secs(2));
    }

    #[test]
    fn test_job_file_round_trip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("job.json");

        let mut config = JobConfig::new("/data/src", "/data/dst");
        config.mirror = true;
        config.exclude_files = vec!["*.tmp".to_string()];
        config.verify = Some(ChecksumAlgorithm::Blake3);
        config.save(&path).expect("Failed to save job");

        let loaded = JobConfig::load(&path).expect("Failed to load job");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_job_file_defaults_missing_fields() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("job.json");
        fs::write(&path, r#"{ "source": "/s", "destination": "/d", "threads": 2 }"#)
            .expect("Failed to write job");

        let loaded = JobConfig::load(&path).expect("Failed to load job");
        assert_eq!(loaded.threads, 2);
        assert_eq!(loaded.retry_count, 3);
        assert!(loaded.copy_timestamps);
    }

    #[test]
    fn test_job_file_parse_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("job.json");
        fs::write(&path, "{ not json").expect("Failed to write job");

        assert!(matches!(JobConfig::load(&path), Err(EngineError::ConfigParse { .. })));
    }
}
