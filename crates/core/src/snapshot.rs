//! Point-in-time mapping of watched paths to their metadata

use crate::record::FileRecord;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Snapshot of every watched path at one scan
///
/// Keys are unique absolute paths. Iteration is in ascending path order,
/// which keeps classification deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, FileRecord>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record already stored for its path
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.entries.insert(record.path().to_path_buf(), record)
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in ascending path order
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    /// Paths in ascending order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Merge another snapshot into this one
    ///
    /// Records from `other` win on path collision.
    pub fn merge(&mut self, other: Snapshot) {
        self.entries.extend(other.entries);
    }

    /// Keep only the records matching the predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&FileRecord) -> bool) {
        self.entries.retain(|_, record| keep(record));
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        self.entries.remove(path)
    }

    /// Remove `path` and its immediate children
    pub fn remove_shallow(&mut self, path: &Path) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|p, _| p.as_path() != path && p.parent() != Some(path));
        before - self.entries.len()
    }

    /// Remove `path` and everything beneath it
    pub fn remove_subtree(&mut self, path: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|p, _| !p.starts_with(path));
        before - self.entries.len()
    }

    /// Records at or beneath `path`
    pub fn subtree<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a FileRecord> + 'a {
        self.entries
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(move |(p, _)| p.starts_with(path))
            .map(|(_, record)| record)
    }
}

impl FromIterator<FileRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        snapshot.extend(iter);
        snapshot
    }
}

impl Extend<FileRecord> for Snapshot {
    fn extend<I: IntoIterator<Item = FileRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a FileRecord;
    type IntoIter = std::collections::btree_map::Values<'a, PathBuf, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
