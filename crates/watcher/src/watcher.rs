//! Poll scheduler
//!
//! Owns the watch state and drives one cycle per interval:
//! list every root -> classify against the previous snapshot -> dispatch ->
//! commit the new snapshot -> sleep.
//!
//! All shared state sits behind one `parking_lot::Mutex`. The lock is only
//! held for in-memory updates, never across a filesystem walk or a channel
//! send.

use crate::dispatch::{send_or_cancel, Dispatcher, Outcome, Shutdown};
use crate::error::{Result, WatchError};
use crate::filter::{FilterPatterns, IgnoreSet};
use crate::lister::{absolutize, list, ListRules};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use pollwatch_core::{classify, Event, FileInfo, Op, Snapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Shortest accepted poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a watcher
///
/// `Idle -> Running -> Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Running,
    Closed,
}

/// A registered root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    /// Absolute, normalized path
    pub path: PathBuf,
    /// Walk the whole subtree rather than immediate children
    pub recursive: bool,
    /// Skip hidden entries beneath this root
    pub skip_hidden: bool,
}

impl WatchRoot {
    /// Whether a listing of this root can contain `path`
    pub fn covers(&self, path: &Path) -> bool {
        if self.recursive {
            path.starts_with(&self.path)
        } else {
            path == self.path || path.parent() == Some(self.path.as_path())
        }
    }
}

/// State guarded by the watcher lock
struct WatchState {
    state: WatcherState,
    roots: BTreeMap<PathBuf, WatchRoot>,
    patterns: BTreeMap<PathBuf, Arc<FilterPatterns>>,
    ignored: IgnoreSet,
    previous: Arc<Snapshot>,
    max_events: usize,
    ops: BTreeSet<Op>,
}

impl WatchState {
    fn new() -> Self {
        Self {
            state: WatcherState::Idle,
            roots: BTreeMap::new(),
            patterns: BTreeMap::new(),
            ignored: IgnoreSet::new(),
            previous: Arc::new(Snapshot::new()),
            max_events: 0,
            ops: BTreeSet::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == WatcherState::Closed {
            return Err(WatchError::Closed);
        }
        Ok(())
    }
}

/// Inputs for one cycle, copied out of the lock
struct CyclePlan {
    roots: Vec<WatchRoot>,
    patterns: BTreeMap<PathBuf, Arc<FilterPatterns>>,
    ignored: IgnoreSet,
    max_events: usize,
    ops: BTreeSet<Op>,
}

/// Polling file watcher
///
/// Share it through `Arc`: one thread calls [`Watcher::start`], which runs
/// the poll loop until [`Watcher::close`]; every other method may be called
/// from any thread.
///
/// Events and errors are delivered over rendezvous channels, so a consumer
/// must keep reading [`Watcher::events`] and [`Watcher::errors`] while the
/// watcher runs.
pub struct Watcher {
    inner: Mutex<WatchState>,

    /// Set once `start` is past setup (or the watcher closed)
    started: Mutex<bool>,
    started_cv: Condvar,

    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    error_tx: Sender<WatchError>,
    error_rx: Receiver<WatchError>,

    /// Forced scans; each request carries its completion channel
    scan_tx: Sender<Sender<()>>,
    scan_rx: Receiver<Sender<()>>,

    shutdown: Shutdown,
}

impl Watcher {
    /// Create an idle watcher with nothing registered
    pub fn new() -> Self {
        let (event_tx, event_rx) = bounded(0);
        let (error_tx, error_rx) = bounded(0);
        let (scan_tx, scan_rx) = bounded(0);
        Self {
            inner: Mutex::new(WatchState::new()),
            started: Mutex::new(false),
            started_cv: Condvar::new(),
            event_tx,
            event_rx,
            error_tx,
            error_rx,
            scan_tx,
            scan_rx,
            shutdown: Shutdown::new(),
        }
    }

    /// Watch `path`
    ///
    /// The path is listed right away to seed the baseline snapshot, so changes
    /// made after `add` returns are reported by the first cycle. Fails with
    /// `NotFound` if the path does not exist.
    pub fn add(&self, path: impl AsRef<Path>, recursive: bool, ignore_hidden: bool) -> Result<()> {
        let path = absolutize(path.as_ref())?;

        let (ignored, patterns) = {
            let inner = self.inner.lock();
            inner.ensure_open()?;
            (inner.ignored.clone(), inner.patterns.get(&path).cloned())
        };

        let rules = ListRules::new(&ignored)
            .skip_hidden(ignore_hidden)
            .patterns(patterns.as_deref());
        let listed = list(&path, recursive, &rules)?;

        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if inner.ignored.covers(&path) {
            debug!("Not watching ignored path {}", path.display());
            return Ok(());
        }

        debug!(
            "Watching {} ({} entries, recursive: {})",
            path.display(),
            listed.len(),
            recursive
        );
        Arc::make_mut(&mut inner.previous).merge(listed);
        inner.roots.insert(
            path.clone(),
            WatchRoot {
                path,
                recursive,
                skip_hidden: ignore_hidden,
            },
        );
        Ok(())
    }

    /// Watch `path` and its whole subtree
    pub fn add_recursive(&self, path: impl AsRef<Path>) -> Result<()> {
        self.add(path, true, false)
    }

    /// Stop watching `path`
    ///
    /// Drops the root and evicts `path` and its immediate children from the
    /// baseline, along with anything no remaining root covers. Unknown paths
    /// are ignored.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolutize(path.as_ref())?;

        let mut inner = self.inner.lock();
        inner.roots.remove(&path);
        inner.patterns.remove(&path);

        let WatchState { roots, previous, .. } = &mut *inner;
        let baseline = Arc::make_mut(previous);
        let before = baseline.len();
        baseline.remove_shallow(&path);
        baseline.retain(|record| roots.values().any(|root| root.covers(record.path())));
        debug!(
            "Removed {} ({} entries evicted)",
            path.display(),
            before - baseline.len()
        );
        Ok(())
    }

    /// Stop watching `path` and everything beneath it
    ///
    /// Roots nested under `path` are dropped too.
    pub fn remove_recursive(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolutize(path.as_ref())?;

        let mut inner = self.inner.lock();
        evict_subtree(&mut inner, &path);
        Ok(())
    }

    /// Exclude `paths` from every listing
    ///
    /// Paths already watched (as roots or as entries) are evicted.
    pub fn ignore<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let paths = paths
            .iter()
            .map(|p| absolutize(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut inner = self.inner.lock();
        for path in paths {
            evict_subtree(&mut inner, &path);
            inner.ignored.insert(path);
        }
        Ok(())
    }

    /// Attach gitignore-style filter patterns to the root at `root`
    ///
    /// Register patterns before adding the root so the baseline is filtered
    /// too; entries already in the baseline that now match are evicted.
    pub fn add_filter_patterns<S: AsRef<str>>(&self, root: impl AsRef<Path>, patterns: &[S]) -> Result<()> {
        let root = absolutize(root.as_ref())?;
        let compiled = Arc::new(FilterPatterns::new(&root, patterns)?);

        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        Arc::make_mut(&mut inner.previous)
            .retain(|record| !compiled.is_excluded(record.path(), record.is_dir()));
        inner.patterns.insert(root, compiled);
        Ok(())
    }

    /// Cap the events delivered per cycle; 0 means unlimited
    pub fn set_max_events(&self, max_events: usize) {
        self.inner.lock().max_events = max_events;
    }

    /// Only deliver events of these kinds; an empty set delivers everything
    pub fn set_filter_ops(&self, ops: impl IntoIterator<Item = Op>) {
        self.inner.lock().ops = ops.into_iter().collect();
    }

    /// Snapshot of everything currently watched
    pub fn watched_files(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.lock().previous)
    }

    /// Registered roots
    pub fn roots(&self) -> Vec<WatchRoot> {
        self.inner.lock().roots.values().cloned().collect()
    }

    /// Explicitly ignored paths
    pub fn ignored(&self) -> Vec<PathBuf> {
        self.inner.lock().ignored.iter().map(Path::to_path_buf).collect()
    }

    pub fn state(&self) -> WatcherState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    /// Change events
    pub fn events(&self) -> Receiver<Event> {
        self.event_rx.clone()
    }

    /// Errors found while polling
    pub fn errors(&self) -> Receiver<WatchError> {
        self.error_rx.clone()
    }

    /// Disconnects once the watcher is closed; nothing is ever received
    pub fn closed(&self) -> Receiver<()> {
        self.shutdown.signal().clone()
    }

    /// Block until `start` has finished setting up, or the watcher closed
    pub fn wait(&self) {
        let mut started = self.started.lock();
        while !*started {
            self.started_cv.wait(&mut started);
        }
    }

    fn mark_started(&self) {
        *self.started.lock() = true;
        self.started_cv.notify_all();
    }

    /// Inject an event directly, bypassing classification
    ///
    /// Without metadata a synthetic placeholder is attached. Blocks until a
    /// consumer receives the event; fails with `Closed` if the watcher closes
    /// first.
    pub fn trigger_event(&self, op: Op, info: Option<FileInfo>) -> Result<()> {
        self.inner.lock().ensure_open()?;

        let event = Event::triggered(op, info);
        trace!("Triggering {}", event);
        if send_or_cancel(&self.event_tx, event, self.shutdown.signal()) {
            Ok(())
        } else {
            Err(WatchError::Closed)
        }
    }

    /// Run the poll loop on the calling thread until `close`
    ///
    /// The first cycle runs immediately, then one per `interval`.
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval < MIN_POLL_INTERVAL {
            return Err(WatchError::IntervalTooShort {
                interval,
                minimum: MIN_POLL_INTERVAL,
            });
        }

        {
            let mut inner = self.inner.lock();
            match inner.state {
                WatcherState::Running => return Err(WatchError::AlreadyRunning),
                WatcherState::Closed => return Err(WatchError::Closed),
                WatcherState::Idle => {}
            }
            if inner.roots.is_empty() {
                return Err(WatchError::NothingAdded);
            }
            inner.state = WatcherState::Running;
        }
        self.mark_started();

        info!("Starting poll loop (interval: {:?})", interval);

        let mut pending_scan: Option<Sender<()>> = None;
        loop {
            self.run_cycle();

            // A scan cut short by close is dropped unanswered
            if let Some(done) = pending_scan.take() {
                if !self.shutdown.is_triggered() {
                    let _ = done.send(());
                }
            }

            select! {
                recv(self.shutdown.signal()) -> _ => break,
                recv(self.scan_rx) -> request => pending_scan = request.ok(),
                default(interval) => {}
            }
        }

        info!("Poll loop stopped");
        Ok(())
    }

    /// Run one cycle now and block until its events are delivered
    ///
    /// Fails with `NotRunning` unless the poll loop is running, including
    /// when the watcher closes while waiting.
    pub fn scan_now(&self) -> Result<()> {
        if !self.is_running() {
            return Err(WatchError::NotRunning);
        }

        let (done_tx, done_rx) = bounded(1);
        if !send_or_cancel(&self.scan_tx, done_tx, self.shutdown.signal()) {
            return Err(WatchError::NotRunning);
        }

        select! {
            recv(done_rx) -> res => res.map_err(|_| WatchError::NotRunning),
            recv(self.shutdown.signal()) -> _ => Err(WatchError::NotRunning),
        }
    }

    /// Stop polling and release everything watched
    ///
    /// Idempotent. Wakes a cycle blocked on delivery, and any `wait` or
    /// `scan_now` callers.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == WatcherState::Closed {
                return;
            }
            inner.state = WatcherState::Closed;
            inner.roots.clear();
            inner.patterns.clear();
            inner.previous = Arc::new(Snapshot::new());
        }

        self.shutdown.trigger();
        self.mark_started();
        info!("Watcher closed");
    }

    /// One list -> classify -> dispatch -> commit pass
    fn run_cycle(&self) {
        let plan = {
            let inner = self.inner.lock();
            if inner.state != WatcherState::Running {
                return;
            }
            CyclePlan {
                roots: inner.roots.values().cloned().collect(),
                patterns: inner.patterns.clone(),
                ignored: inner.ignored.clone(),
                max_events: inner.max_events,
                ops: inner.ops.clone(),
            }
        };

        let Some((mut current, failed)) = self.retrieve_file_list(&plan) else {
            return;
        };

        let previous = Arc::clone(&self.inner.lock().previous);

        // Roots that failed to list keep their baseline for this cycle
        for root in &failed {
            current.extend(
                previous
                    .subtree(&root.path)
                    .filter(|record| root.covers(record.path()))
                    .cloned(),
            );
        }

        let events = classify(&previous, &current);
        let classified = events.len();

        let mut dispatcher = Dispatcher::new(&self.event_tx, self.shutdown.signal(), &plan.ops)
            .max_events(plan.max_events);
        match dispatcher.dispatch(events) {
            Outcome::Cancelled => {
                debug!("Cycle cancelled after {} events", dispatcher.sent());
                return;
            }
            Outcome::LimitReached | Outcome::Drained => {}
        }

        if classified > 0 {
            debug!(
                "Cycle complete: {} changes, {} delivered",
                classified,
                dispatcher.sent()
            );
        } else {
            trace!("Cycle complete: no changes");
        }

        self.commit(current, &plan.roots);
    }

    /// List every root and merge the results
    ///
    /// Vanished roots are dropped from the watch set and reported as
    /// `WatchedFileDeleted`. Their baseline entries are not evicted here, so
    /// the cycle also reports each of them as `Remove` before the commit
    /// forgets them. Other failures are reported and that root is left out of
    /// this cycle (returned as failed). Returns `None` if the watcher closed
    /// meanwhile.
    fn retrieve_file_list(&self, plan: &CyclePlan) -> Option<(Snapshot, Vec<WatchRoot>)> {
        let mut current = Snapshot::new();
        let mut failed = Vec::new();

        for root in &plan.roots {
            let rules = ListRules::new(&plan.ignored)
                .skip_hidden(root.skip_hidden)
                .patterns(plan.patterns.get(&root.path).map(Arc::as_ref));

            let err = match list(&root.path, root.recursive, &rules) {
                Ok(listed) => {
                    current.merge(listed);
                    continue;
                }
                Err(err) if err.is_not_found() => {
                    warn!("Watched path {} deleted, dropping it", root.path.display());
                    let mut inner = self.inner.lock();
                    if inner.roots.get(&root.path) == Some(root) {
                        inner.roots.remove(&root.path);
                    }
                    WatchError::WatchedFileDeleted(root.path.clone())
                }
                Err(err) => {
                    warn!("Failed to list {}: {}", root.path.display(), err);
                    failed.push(root.clone());
                    err
                }
            };

            if !send_or_cancel(&self.error_tx, err, self.shutdown.signal()) {
                return None;
            }
        }

        Some((current, failed))
    }

    /// Replace the baseline with this cycle's snapshot
    ///
    /// Applies changes made while the cycle ran: entries no longer covered by
    /// a root (or now ignored) are dropped, and roots added mid-cycle keep
    /// their existing baseline.
    fn commit(&self, mut current: Snapshot, scanned: &[WatchRoot]) {
        let mut inner = self.inner.lock();
        if inner.state != WatcherState::Running {
            return;
        }

        let WatchState {
            roots,
            ignored,
            previous,
            ..
        } = &mut *inner;

        current.retain(|record| {
            !ignored.covers(record.path()) && roots.values().any(|root| root.covers(record.path()))
        });
        for root in roots.values().filter(|root| !scanned.contains(root)) {
            current.extend(
                previous
                    .subtree(&root.path)
                    .filter(|record| root.covers(record.path()))
                    .cloned(),
            );
        }

        *previous = Arc::new(current);
    }
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Watcher")
            .field("state", &inner.state)
            .field("roots", &inner.roots.len())
            .field("ignored", &inner.ignored.len())
            .field("watched", &inner.previous.len())
            .field("max_events", &inner.max_events)
            .finish()
    }
}

/// Drop roots at or under `path` and evict its subtree from the baseline
fn evict_subtree(inner: &mut WatchState, path: &Path) {
    inner.roots.retain(|root, _| !root.starts_with(path));
    inner.patterns.retain(|root, _| !root.starts_with(path));
    let evicted = Arc::make_mut(&mut inner.previous).remove_subtree(path);
    debug!("Evicted {} ({} entries)", path.display(), evicted);
}
