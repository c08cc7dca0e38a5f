//! Exclusion rules applied while listing
//!
//! Three sources, checked in order:
//! 1. `IgnoreSet`: explicit paths, always enforced
//! 2. Hidden entries (leading `.`, or the hidden attribute on Windows)
//! 3. `FilterPatterns`: gitignore-style patterns attached to a root

use crate::error::{Result, WatchError};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Explicitly ignored absolute paths
///
/// Ignoring a directory excludes its whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    paths: BTreeSet<PathBuf>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns false if it was already present
    pub fn insert(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    /// Exact membership
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Whether `path` or any of its ancestors is ignored
    pub fn covers(&self, path: &Path) -> bool {
        path.ancestors().any(|ancestor| self.paths.contains(ancestor))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Whether an entry is hidden on this platform
///
/// Unix-like systems hide names with a leading dot.
#[cfg(not(windows))]
pub fn is_hidden(name: &OsStr, _metadata: Option<&Metadata>) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Whether an entry is hidden on this platform
///
/// Windows uses the hidden attribute bit; a leading dot also counts so that
/// dotfiles behave as they do elsewhere.
#[cfg(windows)]
pub fn is_hidden(name: &OsStr, metadata: Option<&Metadata>) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

    if name.to_string_lossy().starts_with('.') {
        return true;
    }
    metadata
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

/// Gitignore-style patterns anchored at a watch root
///
/// Patterns are matched relative to `root` with the `ignore` crate, so
/// `node_modules/`, `*.log` and `/build` mean what they mean in .gitignore.
#[derive(Debug, Clone)]
pub struct FilterPatterns {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl FilterPatterns {
    /// Compile patterns for `root`
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add_line(None, pattern)
                .map_err(|e| WatchError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
        }
        let matcher = builder.build().map_err(|e| WatchError::InvalidPattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` (or a directory above it) matches a pattern
    ///
    /// Paths outside the root never match. The root itself is never excluded.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root || !path.starts_with(&self.root) {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}
