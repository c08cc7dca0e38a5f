//! Path lister
//!
//! Enumerates a watch root into a `Snapshot`, applying the exclusion rules.
//! Excluded directories are pruned: the walk never descends into them.
//! Listing is side-effect free, so independent roots can be listed from
//! different threads at once.

use crate::error::{Result, WatchError};
use crate::filter::{is_hidden, FilterPatterns, IgnoreSet};
use pollwatch_core::{FileRecord, Snapshot};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::trace;
use walkdir::{DirEntry, WalkDir};

/// Exclusion rules for one listing
#[derive(Debug, Clone, Copy)]
pub struct ListRules<'a> {
    /// Explicitly ignored paths
    pub ignored: &'a IgnoreSet,
    /// Skip hidden entries (and everything beneath them)
    pub skip_hidden: bool,
    /// Optional gitignore-style patterns for this root
    pub patterns: Option<&'a FilterPatterns>,
}

impl<'a> ListRules<'a> {
    /// Rules with only the ignore set applied
    pub fn new(ignored: &'a IgnoreSet) -> Self {
        Self {
            ignored,
            skip_hidden: false,
            patterns: None,
        }
    }

    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    pub fn patterns(mut self, patterns: Option<&'a FilterPatterns>) -> Self {
        self.patterns = patterns;
        self
    }

    fn excludes(&self, entry: &DirEntry) -> bool {
        let path = entry.path();
        if self.ignored.contains(path) {
            return true;
        }

        if self.skip_hidden {
            let metadata = if cfg!(windows) { entry.metadata().ok() } else { None };
            if is_hidden(entry.file_name(), metadata.as_ref()) {
                return true;
            }
        }

        if let Some(patterns) = self.patterns {
            if patterns.is_excluded(path, entry.file_type().is_dir()) {
                return true;
            }
        }

        false
    }
}

/// List `root` into a snapshot
///
/// Non-recursive listing yields `root` and its immediate children; recursive
/// listing walks the whole subtree. A file root yields just the file.
///
/// Returns `NotFound` when `root` itself is missing and `Io` for any other
/// failure. Entries that vanish mid-walk are skipped.
pub fn list(root: &Path, recursive: bool, rules: &ListRules<'_>) -> Result<Snapshot> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| !rules.excludes(entry));

    let mut snapshot = Snapshot::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() > 0 && is_vanished(err.io_error()) => {
                trace!("Skipping entry that vanished mid-walk: {:?}", err.path());
                continue;
            }
            Err(err) => return Err(walk_error(root, err)),
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) if entry.depth() > 0 && is_vanished(err.io_error()) => continue,
            Err(err) => return Err(walk_error(root, err)),
        };

        snapshot.insert(FileRecord::from_metadata(entry.path(), &metadata));
    }

    trace!("Listed {} entries under {}", snapshot.len(), root.display());
    Ok(snapshot)
}

fn is_vanished(err: Option<&io::Error>) -> bool {
    err.map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}

fn walk_error(root: &Path, err: walkdir::Error) -> WatchError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(source) => WatchError::from_io(path, source),
        None => WatchError::Io {
            path,
            source: io::Error::new(io::ErrorKind::Other, "filesystem loop detected"),
        },
    }
}

/// Make `path` absolute and resolve `.`/`..` lexically
///
/// Symlinks are not followed, and the path need not exist.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| WatchError::from_io(path, e))?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
