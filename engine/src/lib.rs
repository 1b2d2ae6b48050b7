//! # mirrorcopy Engine - Directory Mirroring Library
//!
//! A resumable, multi-threaded directory copy engine in Rust.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! The engine copies or mirrors a source tree into a destination tree.
//! It features:
//! - Filtered, lazy enumeration with subtree pruning
//! - Change detection by size and modification time
//! - Chunked, resumable transfers through `.mcopy-partial` artifacts
//! - A bounded worker pool with per-file retry
//! - Mirror/purge reconciliation of extra destination entries
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mirrorcopy_engine::{run_job, JobConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = JobConfig::new("/data/source", "/backup/source");
//! config.mirror = true;
//! config.threads = 4;
//!
//! let result = run_job(config, None)?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **config**: Job options, validation, JSON job files
//! - **model**: Candidates and per-action outcomes
//! - **error**: Error types and handling
//! - **filter**: Include/exclude patterns and size bounds
//! - **walk**: Directory traversal with pruning
//! - **scan**: Enumeration and change detection
//! - **transfer**: Single-file copy with resume and retry
//! - **job**: Run orchestration and the worker pool
//! - **reconcile**: Removal of extra destination entries
//! - **result**: Run counters and summary
//! - **fs_ops**: Low-level filesystem operations
//! - **progress**: Progress callback trait
//! - **checksums**: Post-copy verification

pub mod checksums;
pub mod config;
pub mod error;
pub mod filter;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod result;
pub mod scan;
pub mod transfer;
pub mod walk;

// Re-export main types and functions
pub use checksums::ChecksumAlgorithm;
pub use config::{JobConfig, MAX_RETRY_COUNT, MAX_WORKERS};
pub use error::EngineError;
pub use fs_ops::{Filesystem, LocalFs};
pub use job::{run_job, CancelToken, CopyEngine};
pub use model::{CandidateFile, OperationOutcome, SkipReason};
pub use progress::{NullProgress, ProgressCallback};
pub use result::{RunError, RunResult};
pub use transfer::{CHUNK_SIZE, SMALL_FILE_THRESHOLD};
