//! Shared helpers for watcher integration tests
//!
//! `Harness` runs the poll loop on a background thread with an interval long
//! enough that only forced scans fire, which keeps every test deterministic.

#![allow(dead_code)]

use crossbeam_channel::{after, bounded, select};
use pollwatch::{Event, Op, WatchError, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::{Builder, TempDir};

/// Interval long enough that the timer never fires during a test
pub const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// Upper bound for any single blocking step
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Scratch directory whose own name is not hidden
pub fn temp_dir() -> TempDir {
    Builder::new().prefix("pollwatch").tempdir().unwrap()
}

/// Everything delivered by one forced scan
#[derive(Debug, Default)]
pub struct Scan {
    pub events: Vec<Event>,
    pub errors: Vec<WatchError>,
}

impl Scan {
    pub fn ops(&self) -> Vec<Op> {
        self.events.iter().map(Event::op).collect()
    }

    /// (op, path relative to `root`) pairs, in delivery order
    pub fn relative(&self, root: &Path) -> Vec<(Op, String)> {
        self.events
            .iter()
            .map(|e| (e.op(), rel(root, e.path())))
            .collect()
    }
}

pub fn rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| path.display().to_string())
}

/// Force a cycle and collect what it delivers
///
/// `scan_now` runs on a helper thread while this thread drains the event and
/// error channels; it returns only after the cycle's dispatch has drained,
/// so everything it produced has been received by then.
pub fn scan(watcher: &Arc<Watcher>) -> Scan {
    let scanner = Arc::clone(watcher);
    let (done_tx, done_rx) = bounded(1);
    let handle = thread::spawn(move || {
        let result = scanner.scan_now();
        let _ = done_tx.send(());
        result
    });

    let events = watcher.events();
    let errors = watcher.errors();
    let deadline = after(STEP_TIMEOUT);
    let mut scan = Scan::default();
    loop {
        select! {
            recv(events) -> event => scan.events.push(event.unwrap()),
            recv(errors) -> err => scan.errors.push(err.unwrap()),
            recv(done_rx) -> _ => break,
            recv(deadline) -> _ => panic!("forced scan timed out"),
        }
    }

    handle.join().unwrap().unwrap();
    scan
}

/// Watcher running on a background thread
pub struct Harness {
    pub watcher: Arc<Watcher>,
    handle: Option<JoinHandle<pollwatch::Result<()>>>,
}

impl Harness {
    /// Start polling and settle the initial cycle
    pub fn start(watcher: Watcher) -> Self {
        init_tracing();

        let watcher = Arc::new(watcher);
        let runner = Arc::clone(&watcher);
        let handle = thread::spawn(move || runner.start(IDLE_INTERVAL));
        watcher.wait();

        let harness = Self {
            watcher,
            handle: Some(handle),
        };
        let settle = harness.scan();
        assert!(settle.events.is_empty(), "unexpected events at start: {:?}", settle.events);
        harness
    }

    pub fn scan(&self) -> Scan {
        scan(&self.watcher)
    }

    /// Close the watcher and return the poll loop's result
    pub fn stop(mut self) -> pollwatch::Result<()> {
        self.watcher.close();
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.watcher.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
