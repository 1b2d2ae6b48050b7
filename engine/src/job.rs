//! Job orchestration module.
//!
//! A run moves through fixed phases:
//! validate → ensure destination → enumerate → transfer (parallel) →
//! reconcile (optional) → finalize.
//!
//! Workers only compute outcomes. The coordinating thread is the single
//! owner of the [`RunResult`]: it receives every outcome over a channel,
//! forwards it to the progress callback, and records it.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;

use crate::config::JobConfig;
use crate::error::EngineError;
use crate::fs_ops::{self, Filesystem, LocalFs};
use crate::model::{CandidateFile, OperationOutcome, SkipReason};
use crate::progress::{NullProgress, ProgressCallback};
use crate::reconcile;
use crate::result::RunResult;
use crate::scan::{ScanItem, Scanner};
use crate::transfer::{Transfer, TransferReport};

/// Cooperative cancellation flag shared between a caller and a running job.
///
/// Checked before each file is dispatched and at every chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The single aggregation point of a run.
struct Coordinator<'a> {
    result: RunResult,
    progress: &'a dyn ProgressCallback,
    /// Source directories that files were moved out of (move-all only)
    vacated: Option<HashSet<PathBuf>>,
}

impl Coordinator<'_> {
    fn apply(&mut self, outcome: OperationOutcome) {
        self.progress.on_outcome(&outcome);
        if let (Some(vacated), OperationOutcome::Copied { source, .. }) = (self.vacated.as_mut(), &outcome) {
            if let Some(parent) = source.parent() {
                vacated.insert(parent.to_path_buf());
            }
        }
        self.result.record(outcome);
    }
}

/// Runs copy jobs.
pub struct CopyEngine {
    config: JobConfig,
    fs: Arc<dyn Filesystem>,
    cancel: CancelToken,
}

impl CopyEngine {
    /// Validate `config` and prepare an engine for it.
    pub fn new(config: JobConfig) -> Result<Self, EngineError> {
        Ok(CopyEngine {
            config: config.validate()?,
            fs: Arc::new(LocalFs),
            cancel: CancelToken::new(),
        })
    }

    /// Replace the filesystem used for transfers.
    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// A handle that cancels this engine's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Execute the job.
    ///
    /// # Errors
    /// Returns EngineError only for setup failures (unreadable source,
    /// destination that cannot be created). File-level errors are recorded
    /// in the result.
    pub fn run(&self, progress: &dyn ProgressCallback) -> Result<RunResult, EngineError> {
        let cleanup_sources = self.config.move_all && !self.config.dry_run;
        let mut coordinator = Coordinator {
            result: RunResult::new(),
            progress,
            vacated: cleanup_sources.then(HashSet::new),
        };
        let span = tracing::info_span!("run", id = %coordinator.result.run_id);
        let _guard = span.enter();

        tracing::info!(
            "copying {} -> {}{}",
            self.config.source.display(),
            self.config.destination.display(),
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        self.ensure_destination(&mut coordinator)?;

        let mut scanner = Scanner::new(&self.config, progress)?;
        let source_root = scanner.root().to_path_buf();
        let mut candidates = Vec::new();
        for item in scanner.by_ref() {
            match item {
                ScanItem::File(candidate) => candidates.push(candidate),
                ScanItem::Directory(relative) => {
                    self.create_directory(&relative, &mut coordinator);
                    if let Some(vacated) = coordinator.vacated.as_mut() {
                        vacated.insert(source_root.join(&relative));
                    }
                }
                ScanItem::Unchanged { source, size, reason } => coordinator.apply(OperationOutcome::Skipped {
                    source,
                    reason,
                    bytes: size,
                }),
            }
        }
        let source_index = scanner.into_index();
        tracing::info!("{} files to transfer", candidates.len());

        self.transfer_all(candidates, &mut coordinator);

        if let Some(vacated) = coordinator.vacated.take() {
            remove_vacated_dirs(&source_root, vacated);
        }

        if self.config.reconcile_enabled() {
            if self.cancel.is_cancelled() {
                tracing::warn!("run cancelled; skipping reconciliation");
            } else {
                reconcile::reconcile(&self.config, &source_index, self.fs.as_ref(), |outcome| {
                    coordinator.apply(outcome)
                });
            }
        }

        let mut result = coordinator.result;
        result.finish();
        tracing::info!(
            "finished: {} copied, {} skipped, {} failed, {} deleted",
            result.files_copied,
            result.files_skipped,
            result.files_failed,
            result.files_deleted
        );
        progress.on_run_completed(&result);
        Ok(result)
    }

    fn ensure_destination(&self, coordinator: &mut Coordinator<'_>) -> Result<(), EngineError> {
        if self.config.dry_run {
            return Ok(());
        }

        let destination = &self.config.destination;
        match fs::metadata(destination) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(EngineError::DestinationCreationFailed {
                path: destination.clone(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "destination exists and is not a directory"),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(destination).map_err(|e| EngineError::DestinationCreationFailed {
                    path: destination.clone(),
                    source: e,
                })?;
                coordinator.apply(OperationOutcome::DirectoryCreated {
                    path: destination.clone(),
                });
                Ok(())
            }
            Err(e) => Err(EngineError::DestinationCreationFailed {
                path: destination.clone(),
                source: e,
            }),
        }
    }

    fn create_directory(&self, relative: &Path, coordinator: &mut Coordinator<'_>) {
        let path = self.config.destination.join(relative);
        if self.config.dry_run {
            tracing::debug!("would create directory {}", path.display());
            return;
        }
        match fs_ops::create_dir_reporting(&path) {
            Ok(Some(created)) => coordinator.apply(OperationOutcome::DirectoryCreated { path: created }),
            Ok(None) => {}
            Err(cause) => coordinator.apply(OperationOutcome::Failed { path, cause }),
        }
    }

    /// Run transfers on a pool of at most `threads` workers.
    ///
    /// Workers pull the next candidate as soon as they finish one, so the
    /// pool stays full while work remains.
    fn transfer_all(&self, candidates: Vec<CandidateFile>, coordinator: &mut Coordinator<'_>) {
        if candidates.is_empty() {
            return;
        }

        let width = self.config.threads.min(candidates.len());
        let (work_tx, work_rx) = unbounded::<CandidateFile>();
        let (done_tx, done_rx) = unbounded::<TransferReport>();
        for candidate in candidates {
            // The receiver is alive until the workers exit.
            let _ = work_tx.send(candidate);
        }
        drop(work_tx);

        let progress = coordinator.progress;
        let transfer = Transfer::new(&self.config, self.fs.as_ref(), progress, &self.cancel);
        let destination_root = self.config.destination.as_path();

        thread::scope(|scope| {
            for _ in 0..width {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                let transfer = &transfer;
                let cancel = &self.cancel;

                scope.spawn(move || {
                    for candidate in work_rx.iter() {
                        let report = if cancel.is_cancelled() {
                            TransferReport {
                                directory_created: None,
                                outcome: OperationOutcome::Skipped {
                                    source: candidate.source,
                                    reason: SkipReason::Cancelled,
                                    bytes: candidate.size,
                                },
                            }
                        } else {
                            progress.on_file_started(&candidate);
                            let report = transfer.copy(&candidate, &candidate.destination_under(destination_root));
                            progress.on_file_finished(&candidate);
                            report
                        };
                        if done_tx.send(report).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            for report in done_rx.iter() {
                if let Some(path) = report.directory_created {
                    coordinator.apply(OperationOutcome::DirectoryCreated { path });
                }
                coordinator.apply(report.outcome);
            }
        });
    }
}

/// Remove vacated source directories, and their ancestors below `root`,
/// once they are empty. Deepest first; the root itself is kept.
fn remove_vacated_dirs(root: &Path, vacated: HashSet<PathBuf>) {
    let mut dirs = BTreeSet::new();
    for dir in &vacated {
        for ancestor in dir.ancestors() {
            if ancestor == root || !ancestor.starts_with(root) {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort_by_key(|dir| Reverse(dir.components().count()));
    for dir in dirs {
        if let Err(e) = fs::remove_dir(&dir) {
            tracing::debug!("keeping source directory {}: {}", dir.display(), e);
        }
    }
}

/// Validate `config` and run it on the local filesystem.
pub fn run_job(config: JobConfig, progress: Option<&dyn ProgressCallback>) -> Result<RunResult, EngineError> {
    let engine = CopyEngine::new(config)?;
    engine.run(progress.unwrap_or(&NullProgress))
}
