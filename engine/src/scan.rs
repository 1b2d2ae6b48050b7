//! Source enumeration and destination diffing.
//!
//! [`Scanner`] walks the source tree lazily, applies the job's filters, and
//! compares every surviving file against its destination counterpart. It
//! yields one [`ScanItem`] per decision; a scanner is consumed by a single
//! pass and cannot be restarted. Every relative path it walks past is kept
//! in a [`SourceIndex`] for reconciliation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use walkdir::DirEntry;

use crate::config::JobConfig;
use crate::error::EngineError;
use crate::filter::Filters;
use crate::fs_ops;
use crate::model::{CandidateFile, SkipReason};
use crate::progress::ProgressCallback;
use crate::walk::{self, Visit};

/// Modification times closer than this are considered equal.
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// Scan progress is reported every this many entries.
const PROGRESS_INTERVAL: u64 = 256;

/// One enumeration decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    /// A file that must be copied
    File(CandidateFile),
    /// A directory to recreate at the destination (relative path)
    Directory(PathBuf),
    /// A file whose destination copy is already current
    Unchanged {
        source: PathBuf,
        size: u64,
        reason: SkipReason,
    },
}

/// Relative paths seen under the source root by one scan.
///
/// Reconciliation consults this rather than the live source tree, which
/// move mode empties while the run progresses.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    present: HashSet<PathBuf>,
    pruned: HashSet<PathBuf>,
}

impl SourceIndex {
    pub fn contains(&self, relative: &Path) -> bool {
        self.present.contains(relative)
    }

    /// Whether the scan stopped at `relative` without looking inside it.
    pub fn is_pruned(&self, relative: &Path) -> bool {
        self.pruned.contains(relative)
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }
}

/// Lazy source-tree enumerator.
pub struct Scanner<'a> {
    root: PathBuf,
    destination: PathBuf,
    entries: walkdir::IntoIter,
    filters: Filters,
    skip_hidden: bool,
    include_empty_dirs: bool,
    force_copy_identical: bool,
    exclude_older: bool,
    progress: &'a dyn ProgressCallback,
    scanned: u64,
    found: u64,
    finished: bool,
    index: SourceIndex,
}

impl<'a> Scanner<'a> {
    /// Prepare a scan of `config.source`.
    ///
    /// Fails with `SourceNotFound` when the root cannot be resolved.
    pub fn new(config: &JobConfig, progress: &'a dyn ProgressCallback) -> Result<Self, EngineError> {
        let root = fs::canonicalize(&config.source).map_err(|_| EngineError::SourceNotFound {
            path: config.source.clone(),
        })?;
        if !root.is_dir() {
            return Err(EngineError::SourceNotDirectory { path: root });
        }
        fs::read_dir(&root).map_err(|_| EngineError::SourceNotFound { path: root.clone() })?;

        Ok(Scanner {
            entries: walk::walker(&root, config.recursive),
            root,
            destination: config.destination.clone(),
            filters: Filters::from_config(config),
            skip_hidden: config.skip_hidden,
            include_empty_dirs: config.include_empty_dirs,
            force_copy_identical: config.force_copy_identical,
            exclude_older: config.exclude_older,
            progress,
            scanned: 0,
            found: 0,
            finished: false,
            index: SourceIndex::default(),
        })
    }

    /// The resolved source root all relative paths are anchored to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The paths walked so far. Complete once the scanner is exhausted.
    pub fn into_index(self) -> SourceIndex {
        self.index
    }

    fn visit(&self, entry: &DirEntry) -> (Visit, Option<ScanItem>) {
        let name = entry.file_name().to_string_lossy();
        if self.skip_hidden && name.starts_with('.') {
            return (Visit::SkipSubtree, None);
        }

        let relative = match entry.path().strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => return (Visit::Continue, None),
        };
        let relative_str = relative.to_string_lossy();

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if self.filters.excludes_dir(&name, &relative_str) {
                tracing::debug!("excluding directory subtree {}", relative.display());
                return (Visit::SkipSubtree, None);
            }
            let item = self.include_empty_dirs.then(|| ScanItem::Directory(relative));
            return (Visit::Continue, item);
        }

        // Symlinks and special files are not copied.
        if !file_type.is_file() {
            return (Visit::Continue, None);
        }
        if fs_ops::is_partial_name(entry.file_name()) {
            tracing::debug!("ignoring transfer artifact {}", relative.display());
            return (Visit::Continue, None);
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("cannot stat {}: {}", entry.path().display(), e);
                return (Visit::Continue, None);
            }
        };
        let size = metadata.len();
        if !self.filters.accepts_file(&name, &relative_str, size) {
            return (Visit::Continue, None);
        }

        let candidate = CandidateFile {
            source: entry.path().to_path_buf(),
            modified: metadata.modified().ok(),
            relative_path: relative,
            size,
        };

        let item = match self.diff(&candidate) {
            Some(reason) => ScanItem::Unchanged {
                source: candidate.source,
                size,
                reason,
            },
            None => ScanItem::File(candidate),
        };
        (Visit::Continue, Some(item))
    }

    /// Decide whether the destination copy makes the transfer unnecessary.
    fn diff(&self, candidate: &CandidateFile) -> Option<SkipReason> {
        let destination = candidate.destination_under(&self.destination);
        let dest_meta = fs::metadata(&destination).ok().filter(|m| m.is_file())?;
        let dest_mtime = dest_meta.modified().ok();

        if !self.force_copy_identical
            && dest_meta.len() == candidate.size
            && mtimes_match(candidate.modified, dest_mtime)
        {
            return Some(SkipReason::Identical);
        }

        if self.exclude_older {
            if let (Some(src), Some(dst)) = (candidate.modified, dest_mtime) {
                if dst >= src {
                    return Some(SkipReason::DestinationNotOlder);
                }
            }
        }

        None
    }

    fn report_progress(&self) {
        self.progress.on_scan_progress(self.scanned, self.found);
    }
}

impl Iterator for Scanner<'_> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        if self.finished {
            return None;
        }

        while let Some(next) = self.entries.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {}", e);
                    // Its destination counterpart must not look extra.
                    if let Some(relative) = e.path().and_then(|p| p.strip_prefix(&self.root).ok()) {
                        self.index.present.insert(relative.to_path_buf());
                        self.index.pruned.insert(relative.to_path_buf());
                    }
                    continue;
                }
            };

            self.scanned += 1;
            let (visit, item) = self.visit(&entry);
            let prune = visit == Visit::SkipSubtree && entry.file_type().is_dir();
            if prune {
                self.entries.skip_current_dir();
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                self.index.present.insert(relative.to_path_buf());
                if prune {
                    self.index.pruned.insert(relative.to_path_buf());
                }
            }
            if item.is_some() {
                self.found += 1;
            }
            if self.scanned % PROGRESS_INTERVAL == 0 {
                self.report_progress();
            }
            if item.is_some() {
                return item;
            }
        }

        self.finished = true;
        self.report_progress();
        None
    }
}

/// Scan `config.source` and collect every decision.
pub fn scan(config: &JobConfig, progress: &dyn ProgressCallback) -> Result<Vec<ScanItem>, EngineError> {
    Ok(Scanner::new(config, progress)?.collect())
}

fn mtimes_match(a: Option<SystemTime>, b: Option<SystemTime>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let delta = a.duration_since(b).unwrap_or_else(|e| e.duration());
            delta <= MTIME_TOLERANCE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use filetime::FileTime;

    fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    fn files(items: &[ScanItem]) -> Vec<PathBuf> {
        let mut files: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                ScanItem::File(c) => Some(c.relative_path.clone()),
                _ => None,
            })
            .collect();
        files.sort();
        files
    }

    fn config(temp: &Path) -> JobConfig {
        let mut config = JobConfig::new(temp.join("src"), temp.join("dst"));
        config.recursive = true;
        config
    }

    #[test]
    fn test_scan_nested_tree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("file1.txt"), b"data1");
        write(&src.join("subdir/file2.txt"), b"data2");

        let items = scan(&config(temp_dir.path()), &NullProgress).expect("scan");
        assert_eq!(
            files(&items),
            vec![PathBuf::from("file1.txt"), PathBuf::from("subdir/file2.txt")]
        );
    }

    #[test]
    fn test_scan_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = scan(&config(temp_dir.path()), &NullProgress);
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_excluded_directory_prunes_subtree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("keep.txt"), b"k");
        write(&src.join("node_modules/pkg/index.js"), b"x");
        write(&src.join("node_modules/readme.md"), b"x");

        let mut config = config(temp_dir.path());
        config.exclude_dirs = vec!["node_modules".to_string()];
        config.include_empty_dirs = true;

        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("keep.txt")]);
        assert!(!items.contains(&ScanItem::Directory(PathBuf::from("node_modules"))));
        assert!(!items.contains(&ScanItem::Directory(PathBuf::from("node_modules/pkg"))));
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("visible.txt"), b"v");
        write(&src.join(".hidden"), b"h");
        write(&src.join(".git/config"), b"c");

        let mut config = config(temp_dir.path());
        config.skip_hidden = true;
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("visible.txt")]);

        config.skip_hidden = false;
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items).len(), 3);
    }

    #[test]
    fn test_include_exclude_and_size_filters() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("a.log"), b"0123456789");
        write(&src.join("b.log"), b"01");
        write(&src.join("c.txt"), b"0123456789");
        write(&src.join("skip.log"), b"0123456789");

        let mut config = config(temp_dir.path());
        config.include_files = vec!["*.LOG".to_string()];
        config.exclude_files = vec!["skip.*".to_string()];
        config.min_size = Some(5);

        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("a.log")]);
    }

    #[test]
    fn test_identical_destination_is_unchanged() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src/same.txt");
        let dst = temp_dir.path().join("dst/same.txt");
        write(&src, b"same");
        write(&dst, b"same");
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, mtime).expect("set mtime");
        filetime::set_file_mtime(&dst, FileTime::from_unix_time(1_600_000_000, 500_000_000))
            .expect("set mtime");

        let mut config = config(temp_dir.path());
        let items = scan(&config, &NullProgress).expect("scan");
        assert!(matches!(
            items.as_slice(),
            [ScanItem::Unchanged { reason: SkipReason::Identical, size: 4, .. }]
        ));

        config.force_copy_identical = true;
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("same.txt")]);
    }

    #[test]
    fn test_changed_size_is_copied() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src/f.txt");
        let dst = temp_dir.path().join("dst/f.txt");
        write(&src, b"longer content");
        write(&dst, b"short");
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, mtime).expect("set mtime");
        filetime::set_file_mtime(&dst, mtime).expect("set mtime");

        let items = scan(&config(temp_dir.path()), &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("f.txt")]);
    }

    #[test]
    fn test_exclude_older() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src/f.txt");
        let dst = temp_dir.path().join("dst/f.txt");
        write(&src, b"new source");
        write(&dst, b"dest");
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_600_000_000, 0))
            .expect("set mtime");
        filetime::set_file_mtime(&dst, FileTime::from_unix_time(1_700_000_000, 0))
            .expect("set mtime");

        let mut config = config(temp_dir.path());
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items).len(), 1);

        config.exclude_older = true;
        let items = scan(&config, &NullProgress).expect("scan");
        assert!(matches!(
            items.as_slice(),
            [ScanItem::Unchanged { reason: SkipReason::DestinationNotOlder, .. }]
        ));
    }

    #[test]
    fn test_relative_path_survives_repeated_root_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("src/src/file.txt"), b"x");

        let items = scan(&config(temp_dir.path()), &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("src/src/file.txt")]);
    }

    #[test]
    fn test_non_recursive_scan() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("top.txt"), b"t");
        write(&src.join("sub/inner.txt"), b"i");

        let mut config = config(temp_dir.path());
        config.recursive = false;
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(files(&items), vec![PathBuf::from("top.txt")]);
    }

    #[test]
    fn test_transfer_artifacts_are_not_candidates() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("a"), b"real");
        write(&src.join("a.partial"), b"also real");
        write(&src.join("a.mcopy-partial"), b"leftover");

        let items = scan(&config(temp_dir.path()), &NullProgress).expect("scan");
        assert_eq!(
            files(&items),
            vec![PathBuf::from("a"), PathBuf::from("a.partial")]
        );
    }

    #[test]
    fn test_index_records_walked_and_pruned_paths() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("keep.txt"), b"k");
        write(&src.join("skip.tmp"), b"t");
        write(&src.join("cache/blob"), b"b");

        let mut config = config(temp_dir.path());
        config.exclude_files = vec!["*.tmp".to_string()];
        config.exclude_dirs = vec!["cache".to_string()];
        let mut scanner = Scanner::new(&config, &NullProgress).expect("scanner");
        scanner.by_ref().for_each(drop);
        let index = scanner.into_index();

        assert!(index.contains(Path::new("keep.txt")));
        // Filtered files still exist at the source
        assert!(index.contains(Path::new("skip.tmp")));
        assert!(index.contains(Path::new("cache")));
        assert!(index.is_pruned(Path::new("cache")));
        assert!(!index.contains(Path::new("cache/blob")));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_directories_only_with_empty_dir_inclusion() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("empty/nested")).expect("Failed to create dirs");

        let mut config = config(temp_dir.path());
        assert!(scan(&config, &NullProgress).expect("scan").is_empty());

        config.include_empty_dirs = true;
        let items = scan(&config, &NullProgress).expect("scan");
        assert_eq!(
            items,
            vec![
                ScanItem::Directory(PathBuf::from("empty")),
                ScanItem::Directory(PathBuf::from("empty/nested")),
            ]
        );
    }
}
