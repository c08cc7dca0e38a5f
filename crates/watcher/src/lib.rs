//! Polling file watcher
//!
//! Detects changes by re-listing watched paths on an interval and diffing
//! each listing against the previous one, instead of relying on OS
//! notification APIs. Behaves the same on every platform.
//!
//! - `lister`: walks a root into a `Snapshot` (hidden/ignore/pattern rules)
//! - `pollwatch_core::classify`: snapshot diff with rename correlation
//! - `dispatch`: cancellable delivery with a per-cycle cap
//! - `watcher`: the poll loop, state machine and public API
//!
//! ```no_run
//! use pollwatch::Watcher;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let watcher = Arc::new(Watcher::new());
//! watcher.add_recursive("./src")?;
//!
//! let events = watcher.events();
//! std::thread::spawn(move || {
//!     for event in events {
//!         println!("{event}");
//!     }
//! });
//!
//! watcher.start(Duration::from_millis(100))?;
//! # Ok::<(), pollwatch::WatchError>(())
//! ```

pub mod config;
mod dispatch;
pub mod error;
pub mod filter;
pub mod lister;
pub mod watcher;

pub use config::{RootConfig, WatcherConfig};
pub use error::{Result, WatchError};
pub use filter::{FilterPatterns, IgnoreSet};
pub use lister::{list, ListRules};
pub use watcher::{WatchRoot, Watcher, WatcherState, MIN_POLL_INTERVAL};

pub use pollwatch_core::{
    classify, Event, FileIdentity, FileInfo, FileRecord, Op, Snapshot, SyntheticFile,
};
