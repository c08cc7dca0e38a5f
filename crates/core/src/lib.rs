//! Snapshot data model and diff classifier for pollwatch
//!
//! This crate holds the pure half of the polling watcher:
//! - `FileRecord` / `FileInfo`: metadata captured for one path
//! - `Snapshot`: path -> record mapping produced by one scan
//! - `Event` / `Op`: classified changes
//! - `classify`: diff of two snapshots, with rename correlation
//!
//! Nothing here touches the filesystem except `FileRecord::from_metadata`.

pub mod classify;
pub mod event;
pub mod record;
pub mod snapshot;

pub use classify::classify;
pub use event::{Event, Op, ParseOpError};
pub use record::{FileIdentity, FileInfo, FileRecord, SyntheticFile};
pub use snapshot::Snapshot;
