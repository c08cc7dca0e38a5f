//! File metadata captured during a scan

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Platform identity of a file
///
/// On Unix this is the (device, inode) pair. Two records carrying equal
/// identities refer to the same underlying file, whatever their paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,
}

impl FileIdentity {
    /// Read the identity from stat metadata
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    /// Read the identity from stat metadata
    ///
    /// Not available on this platform; rename correlation falls back to
    /// metadata equality.
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Metadata for one path, captured once per scan
///
/// Immutable after capture: every field is read through an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    path: PathBuf,
    name: String,
    size: u64,
    modified: SystemTime,
    mode: u32,
    is_dir: bool,
    identity: Option<FileIdentity>,
}

impl FileRecord {
    /// Build a record from explicit values
    ///
    /// The base name is derived from `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        modified: SystemTime,
        mode: u32,
        is_dir: bool,
    ) -> Self {
        let path = path.into();
        let name = base_name(&path);
        Self {
            path,
            name,
            size,
            modified,
            mode,
            is_dir,
            identity: None,
        }
    }

    /// Attach a platform identity token
    pub fn with_identity(mut self, identity: FileIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Capture a record from filesystem metadata
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        let path = path.into();
        let name = base_name(&path);
        Self {
            path,
            name,
            size: metadata.len(),
            // Platforms without mtime support report the epoch.
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            mode: permission_bits(metadata),
            is_dir: metadata.is_dir(),
            identity: FileIdentity::from_metadata(metadata),
        }
    }

    /// Absolute path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name (last path component)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Permission/mode bits
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Platform identity, if the platform exposes one
    pub fn identity(&self) -> Option<FileIdentity> {
        self.identity
    }

    /// Parent directory, if any
    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    let base = if metadata.permissions().readonly() { 0o444 } else { 0o666 };
    if metadata.is_dir() {
        base | 0o111
    } else {
        base
    }
}

/// Placeholder metadata for events that were not produced by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticFile {
    name: String,
    modified: SystemTime,
}

impl SyntheticFile {
    /// Placeholder with the given name, stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modified: SystemTime::now(),
        }
    }
}

impl Default for SyntheticFile {
    fn default() -> Self {
        Self::new("triggered event")
    }
}

/// Metadata attached to an event
///
/// Scanned events always carry `Real`. Manually triggered events carry
/// `Synthetic` unless the caller supplied a real record, so accessors are
/// always safe to call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInfo {
    /// Metadata captured from the filesystem
    Real(FileRecord),
    /// Placeholder metadata
    Synthetic(SyntheticFile),
}

impl FileInfo {
    pub fn name(&self) -> &str {
        match self {
            FileInfo::Real(record) => record.name(),
            FileInfo::Synthetic(file) => &file.name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            FileInfo::Real(record) => record.size(),
            FileInfo::Synthetic(_) => 0,
        }
    }

    pub fn modified(&self) -> SystemTime {
        match self {
            FileInfo::Real(record) => record.modified(),
            FileInfo::Synthetic(file) => file.modified,
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            FileInfo::Real(record) => record.mode(),
            FileInfo::Synthetic(_) => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            FileInfo::Real(record) => record.is_dir(),
            FileInfo::Synthetic(_) => false,
        }
    }

    /// The underlying record, for scanned metadata
    pub fn record(&self) -> Option<&FileRecord> {
        match self {
            FileInfo::Real(record) => Some(record),
            FileInfo::Synthetic(_) => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, FileInfo::Synthetic(_))
    }
}

impl From<FileRecord> for FileInfo {
    fn from(record: FileRecord) -> Self {
        FileInfo::Real(record)
    }
}

impl From<SyntheticFile> for FileInfo {
    fn from(file: SyntheticFile) -> Self {
        FileInfo::Synthetic(file)
    }
}
