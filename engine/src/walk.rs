//! Directory traversal with explicit subtree pruning.
//!
//! Visitors return a [`Visit`] signal for every entry; returning
//! [`Visit::SkipSubtree`] for a directory stops the walk from descending
//! into it.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::EngineError;

/// Traversal control returned by a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    SkipSubtree,
}

/// Build the walker shared by the enumerator and the reconciler.
///
/// The root itself is not yielded. Symlinks are not followed, and entries
/// are sorted by name so runs are reproducible.
pub(crate) fn walker(root: &Path, recursive: bool) -> walkdir::IntoIter {
    let mut walk = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if !recursive {
        walk = walk.max_depth(1);
    }
    walk.into_iter()
}

/// Walk `root`, handing every entry to `visitor`.
///
/// Errors below the root are logged and skipped; an unreadable root fails.
pub fn walk<F>(root: &Path, recursive: bool, mut visitor: F) -> Result<(), EngineError>
where
    F: FnMut(&DirEntry) -> Visit,
{
    let mut entries = walker(root, recursive);

    while let Some(next) = entries.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(EngineError::Enumeration {
                    path: root.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        if visitor(&entry) == Visit::SkipSubtree && entry.file_type().is_dir() {
            entries.skip_current_dir();
        }
    }

    Ok(())
}
