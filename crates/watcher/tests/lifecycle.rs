//! Watcher state machine and shutdown behavior

mod common;

use anyhow::Result;
use common::{init_tracing, temp_dir, Harness, IDLE_INTERVAL, STEP_TIMEOUT};
use crossbeam_channel::bounded;
use pollwatch::{Op, WatchError, Watcher, WatcherState, MIN_POLL_INTERVAL};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn watcher_on(dir: &std::path::Path) -> Result<Watcher> {
    fs::write(dir.join("a.txt"), b"a")?;
    let watcher = Watcher::new();
    watcher.add_recursive(dir)?;
    Ok(watcher)
}

#[test]
fn test_interval_too_short() -> Result<()> {
    let dir = temp_dir();
    let watcher = watcher_on(dir.path())?;

    let err = watcher.start(Duration::ZERO).unwrap_err();
    assert!(matches!(err, WatchError::IntervalTooShort { .. }));

    let err = watcher.start(MIN_POLL_INTERVAL / 2).unwrap_err();
    assert!(matches!(err, WatchError::IntervalTooShort { .. }));
    assert_eq!(watcher.state(), WatcherState::Idle);
    Ok(())
}

#[test]
fn test_start_with_nothing_added() {
    let watcher = Watcher::new();
    let err = watcher.start(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, WatchError::NothingAdded));
}

#[test]
fn test_scan_now_before_start() -> Result<()> {
    let dir = temp_dir();
    let watcher = watcher_on(dir.path())?;

    assert!(matches!(watcher.scan_now(), Err(WatchError::NotRunning)));
    Ok(())
}

#[test]
fn test_add_missing_path() {
    let dir = temp_dir();
    let watcher = Watcher::new();

    let err = watcher.add_recursive(dir.path().join("random_filename.txt")).unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(watcher.roots().is_empty());
}

#[test]
fn test_add_then_remove() -> Result<()> {
    let dir = temp_dir();
    let root = dir.path();
    fs::create_dir(root.join("sub"))?;
    fs::write(root.join("a.txt"), b"a")?;
    fs::write(root.join("b.txt"), b"b")?;

    let watcher = Watcher::new();
    watcher.add(root, false, false)?;
    // Root plus three children
    assert_eq!(watcher.watched_files().len(), 4);
    assert_eq!(watcher.roots().len(), 1);

    watcher.remove(root)?;
    assert!(watcher.watched_files().is_empty());
    assert!(watcher.roots().is_empty());
    Ok(())
}

#[test]
fn test_remove_recursive_root_evicts_whole_subtree() -> Result<()> {
    let dir = temp_dir();
    let root = dir.path();
    fs::create_dir_all(root.join("a/sub"))?;
    fs::write(root.join("a/sub/deep.txt"), b"d")?;
    fs::write(root.join("keep.txt"), b"k")?;

    let watcher = Watcher::new();
    watcher.add_recursive(root.join("a"))?;
    watcher.add(root.join("keep.txt"), false, false)?;

    watcher.remove(root.join("a"))?;
    let watched = watcher.watched_files();
    assert_eq!(watched.paths().collect::<Vec<_>>(), vec![root.join("keep.txt").as_path()]);
    Ok(())
}

#[test]
fn test_remove_recursive_drops_nested_roots() -> Result<()> {
    let dir = temp_dir();
    let root = dir.path();
    fs::create_dir_all(root.join("sub/deep"))?;
    fs::write(root.join("sub/deep/c.txt"), b"c")?;

    let watcher = Watcher::new();
    watcher.add_recursive(root)?;
    watcher.add_recursive(root.join("sub/deep"))?;
    assert_eq!(watcher.roots().len(), 2);

    watcher.remove_recursive(root)?;
    assert!(watcher.roots().is_empty());
    assert!(watcher.watched_files().is_empty());
    Ok(())
}

#[test]
fn test_watched_files_is_a_stable_view() -> Result<()> {
    let dir = temp_dir();
    let watcher = watcher_on(dir.path())?;

    let before = watcher.watched_files();
    watcher.remove_recursive(dir.path())?;

    // The earlier view is unaffected by later mutation
    assert_eq!(before.len(), 2);
    assert!(watcher.watched_files().is_empty());
    Ok(())
}

#[test]
fn test_start_twice_is_rejected() -> Result<()> {
    let dir = temp_dir();
    let harness = Harness::start(watcher_on(dir.path())?);

    assert!(harness.watcher.is_running());
    let err = harness.watcher.start(IDLE_INTERVAL).unwrap_err();
    assert!(matches!(err, WatchError::AlreadyRunning));

    harness.stop()?;
    Ok(())
}

#[test]
fn test_close_is_idempotent_and_terminal() -> Result<()> {
    let dir = temp_dir();
    let harness = Harness::start(watcher_on(dir.path())?);
    let watcher = Arc::clone(&harness.watcher);

    harness.stop()?;
    watcher.close();

    assert_eq!(watcher.state(), WatcherState::Closed);
    assert!(watcher.roots().is_empty());
    assert!(watcher.watched_files().is_empty());
    assert!(matches!(watcher.start(IDLE_INTERVAL), Err(WatchError::Closed)));
    assert!(matches!(watcher.scan_now(), Err(WatchError::NotRunning)));
    assert!(matches!(watcher.add_recursive(dir.path()), Err(WatchError::Closed)));

    // The closed channel disconnects rather than blocking
    assert!(watcher.closed().recv_timeout(STEP_TIMEOUT).is_err());
    Ok(())
}

#[test]
fn test_wait_released_by_close() {
    let watcher = Arc::new(Watcher::new());
    let waiter = Arc::clone(&watcher);
    let (tx, rx) = bounded(1);

    thread::spawn(move || {
        waiter.wait();
        let _ = tx.send(());
    });

    thread::sleep(Duration::from_millis(20));
    watcher.close();
    assert!(rx.recv_timeout(STEP_TIMEOUT).is_ok());
}

#[test]
fn test_timer_drives_cycles() -> Result<()> {
    init_tracing();
    let dir = temp_dir();
    let watcher = Arc::new(watcher_on(dir.path())?);

    let runner = Arc::clone(&watcher);
    let handle = thread::spawn(move || runner.start(Duration::from_millis(10)));
    watcher.wait();

    fs::write(dir.path().join("timed.txt"), b"t")?;

    let event = watcher.events().recv_timeout(STEP_TIMEOUT)?;
    assert_eq!(event.op(), Op::Create);
    assert_eq!(event.path(), dir.path().join("timed.txt"));

    watcher.close();
    assert!(handle.join().unwrap().is_ok());
    Ok(())
}

#[test]
fn test_trigger_event_uses_placeholder() -> Result<()> {
    let dir = temp_dir();
    let harness = Harness::start(watcher_on(dir.path())?);

    let trigger = Arc::clone(&harness.watcher);
    let sender = thread::spawn(move || trigger.trigger_event(Op::Write, None));

    let event = harness.watcher.events().recv_timeout(STEP_TIMEOUT)?;
    sender.join().unwrap()?;

    assert_eq!(event.op(), Op::Write);
    assert_eq!(event.path(), std::path::Path::new("-"));
    assert!(event.info().is_synthetic());
    assert_eq!(event.info().name(), "triggered event");
    Ok(())
}

#[test]
fn test_close_unblocks_stalled_dispatch() -> Result<()> {
    init_tracing();
    let dir = temp_dir();
    let watcher = Arc::new(watcher_on(dir.path())?);

    let runner = Arc::clone(&watcher);
    let (stopped_tx, stopped_rx) = bounded(1);
    thread::spawn(move || {
        let result = runner.start(IDLE_INTERVAL);
        let _ = stopped_tx.send(result);
    });
    watcher.wait();

    // Nobody reads events: the next cycle blocks on its first send
    for i in 0..3 {
        fs::write(dir.path().join(format!("stalled{i}.txt")), b"s")?;
    }
    let scanner = Arc::clone(&watcher);
    let (scan_tx, scan_rx) = bounded(1);
    thread::spawn(move || {
        let _ = scan_tx.send(scanner.scan_now());
    });

    thread::sleep(Duration::from_millis(100));
    watcher.close();

    let result = stopped_rx.recv_timeout(STEP_TIMEOUT)?;
    assert!(result.is_ok());
    let scan_result = scan_rx.recv_timeout(STEP_TIMEOUT)?;
    assert!(matches!(scan_result, Err(WatchError::NotRunning)));
    Ok(())
}

#[test]
fn test_trigger_event_after_close() {
    let watcher = Watcher::new();
    watcher.close();
    assert!(matches!(
        watcher.trigger_event(Op::Create, None),
        Err(WatchError::Closed)
    ));
}
