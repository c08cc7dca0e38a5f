//! Classified change events

use crate::record::{FileInfo, FileRecord, SyntheticFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of change observed between two scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Path appeared
    Create,
    /// Modification time changed
    Write,
    /// Path disappeared
    Remove,
    /// Path moved within its parent directory
    Rename,
    /// Permission bits changed
    Chmod,
}

impl Op {
    /// All operation kinds
    pub const ALL: [Op; 5] = [Op::Create, Op::Write, Op::Remove, Op::Rename, Op::Chmod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Create => "CREATE",
            Op::Write => "WRITE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Chmod => "CHMOD",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown operation name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOpError(pub String);

impl fmt::Display for ParseOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation: {:?}", self.0)
    }
}

impl std::error::Error for ParseOpError {}

impl FromStr for Op {
    type Err = ParseOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseOpError(s.to_string()))
    }
}

/// A single change, emitted and never stored
///
/// `old_path` is `Some` exactly when `op` is `Op::Rename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    op: Op,
    path: PathBuf,
    old_path: Option<PathBuf>,
    info: FileInfo,
}

impl Event {
    /// Event for `path` carrying `info`
    ///
    /// A `Rename` built this way is a rename onto itself: its old path is
    /// `path`. Use [`Event::rename`] for real renames.
    pub fn new(op: Op, path: impl Into<PathBuf>, info: impl Into<FileInfo>) -> Self {
        let path = path.into();
        let old_path = (op == Op::Rename).then(|| path.clone());
        Self {
            op,
            path,
            old_path,
            info: info.into(),
        }
    }

    /// Event for a scanned record, reported at the record's own path
    pub fn for_record(op: Op, record: FileRecord) -> Self {
        let path = record.path().to_path_buf();
        Self::new(op, path, record)
    }

    /// Rename from `from` to the destination record's path
    pub fn rename(from: impl Into<PathBuf>, to: FileRecord) -> Self {
        Self {
            op: Op::Rename,
            path: to.path().to_path_buf(),
            old_path: Some(from.into()),
            info: FileInfo::Real(to),
        }
    }

    /// Manually triggered event
    ///
    /// Without metadata a synthetic placeholder is used and the path is `-`.
    pub fn triggered(op: Op, info: Option<FileInfo>) -> Self {
        let info = info.unwrap_or_else(|| FileInfo::Synthetic(SyntheticFile::default()));
        let path = info
            .record()
            .map(|r| r.path().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("-"));
        Self::new(op, path, info)
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// Current path (the destination, for renames)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source path of a rename
    pub fn old_path(&self) -> Option<&Path> {
        self.old_path.as_deref()
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_dir() { "DIRECTORY" } else { "FILE" };
        write!(f, "{} {:?} {} [", kind, self.info.name(), self.op)?;
        if let Some(old) = &self.old_path {
            write!(f, "{} -> ", old.display())?;
        }
        write!(f, "{}]", self.path.display())
    }
}
