//! Event dispatcher
//!
//! Delivers classified events one at a time over a rendezvous channel.
//! Before every send the dispatcher checks the shutdown signal and the
//! per-cycle cap; a blocked send is also woken by shutdown, so a consumer
//! that stopped reading can never wedge `close`.

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use pollwatch_core::{Event, Op};
use std::collections::BTreeSet;
use tracing::debug;

/// One-shot shutdown signal
///
/// Triggering drops the only sender, so every clone of the receiver sees a
/// disconnect at once. Nothing is ever sent on the channel.
pub(crate) struct Shutdown {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            signal: rx,
        }
    }

    /// Fire the signal; returns false if it had already fired
    pub(crate) fn trigger(&self) -> bool {
        self.trigger.lock().take().is_some()
    }

    pub(crate) fn is_triggered(&self) -> bool {
        is_closed(&self.signal)
    }

    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

fn is_closed(signal: &Receiver<()>) -> bool {
    matches!(signal.try_recv(), Err(TryRecvError::Disconnected))
}

/// Send `value`, blocking until it is received or `shutdown` fires
///
/// Returns false if the value was not delivered.
pub(crate) fn send_or_cancel<T>(tx: &Sender<T>, value: T, shutdown: &Receiver<()>) -> bool {
    if is_closed(shutdown) {
        return false;
    }
    select! {
        send(tx, value) -> res => res.is_ok(),
        recv(shutdown) -> _ => false,
    }
}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Every event was delivered
    Drained,
    /// `max_events` was hit; the rest of the cycle was discarded
    LimitReached,
    /// Shutdown fired mid-dispatch
    Cancelled,
}

/// Per-cycle event dispatcher
pub(crate) struct Dispatcher<'a> {
    events: &'a Sender<Event>,
    shutdown: &'a Receiver<()>,
    /// 0 = unlimited
    max_events: usize,
    /// Empty = every op
    ops: &'a BTreeSet<Op>,
    sent: usize,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(
        events: &'a Sender<Event>,
        shutdown: &'a Receiver<()>,
        ops: &'a BTreeSet<Op>,
    ) -> Self {
        Self {
            events,
            shutdown,
            max_events: 0,
            ops,
            sent: 0,
        }
    }

    pub(crate) fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Events delivered so far
    pub(crate) fn sent(&self) -> usize {
        self.sent
    }

    fn wants(&self, event: &Event) -> bool {
        self.ops.is_empty() || self.ops.contains(&event.op())
    }

    fn limit_reached(&self) -> bool {
        self.max_events > 0 && self.sent >= self.max_events
    }

    /// Deliver a cycle's events in order
    pub(crate) fn dispatch(&mut self, events: Vec<Event>) -> Outcome {
        let mut pending = events.into_iter();
        while let Some(event) = pending.next() {
            if !self.wants(&event) {
                continue;
            }
            if !send_or_cancel(self.events, event, self.shutdown) {
                return Outcome::Cancelled;
            }
            self.sent += 1;

            if self.limit_reached() {
                let discarded = pending.filter(|e| self.wants(e)).count();
                if discarded > 0 {
                    debug!(
                        "Max events ({}) reached, discarding {} events",
                        self.max_events, discarded
                    );
                    return Outcome::LimitReached;
                }
                break;
            }
        }
        Outcome::Drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use pollwatch_core::FileRecord;
    use std::thread;
    use std::time::{Duration, Instant, UNIX_EPOCH};

    fn events(ops: &[Op]) -> Vec<Event> {
        ops.iter()
            .enumerate()
            .map(|(i, op)| {
                let record = FileRecord::new(format!("/d/{i}.txt"), 1, UNIX_EPOCH, 0o644, false);
                Event::for_record(*op, record)
            })
            .collect()
    }

    #[test]
    fn test_drains_all_events() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        let ops = BTreeSet::new();

        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops);
        let outcome = dispatcher.dispatch(events(&[Op::Create, Op::Write, Op::Remove]));

        assert_eq!(outcome, Outcome::Drained);
        assert_eq!(dispatcher.sent(), 3);
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn test_max_events_discards_rest() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        let ops = BTreeSet::new();

        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops).max_events(2);
        let outcome = dispatcher.dispatch(events(&[Op::Create; 5]));

        assert_eq!(outcome, Outcome::LimitReached);
        let delivered: Vec<_> = rx.try_iter().map(|e| e.path().to_path_buf()).collect();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].ends_with("0.txt"));
        assert!(delivered[1].ends_with("1.txt"));
    }

    #[test]
    fn test_cap_equal_to_cycle_is_drained() {
        let shutdown = Shutdown::new();
        let (tx, _rx) = unbounded();
        let ops = BTreeSet::new();

        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops).max_events(2);
        assert_eq!(dispatcher.dispatch(events(&[Op::Write; 2])), Outcome::Drained);
    }

    #[test]
    fn test_filtered_ops_do_not_count() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        let ops: BTreeSet<Op> = [Op::Write].into_iter().collect();

        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops).max_events(1);
        let outcome = dispatcher.dispatch(events(&[Op::Create, Op::Create, Op::Write]));

        assert_eq!(outcome, Outcome::Drained);
        let delivered: Vec<Op> = rx.try_iter().map(|e| e.op()).collect();
        assert_eq!(delivered, vec![Op::Write]);
    }

    #[test]
    fn test_cancelled_before_send() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        let ops = BTreeSet::new();

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());

        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops);
        assert_eq!(dispatcher.dispatch(events(&[Op::Create])), Outcome::Cancelled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_blocked_send_wakes_on_shutdown() {
        let shutdown = std::sync::Arc::new(Shutdown::new());
        // Rendezvous channel nobody reads from
        let (tx, _rx) = bounded::<Event>(0);

        let trigger = std::sync::Arc::clone(&shutdown);
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let started = Instant::now();
        let ops = BTreeSet::new();
        let mut dispatcher = Dispatcher::new(&tx, shutdown.signal(), &ops);
        let outcome = dispatcher.dispatch(events(&[Op::Create, Op::Create]));
        closer.join().unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(dispatcher.sent(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
