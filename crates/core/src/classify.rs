//! Snapshot diff classifier
//!
//! Compares the previous scan against the current one and turns the
//! difference into events:
//! 1. Created / removed paths
//! 2. Rename correlation between removed and created paths sharing a parent
//! 3. Remaining creates and removes
//! 4. In-place writes (mtime) and chmods (mode) for paths present in both
//!
//! Paths are visited in ascending order, so the output is deterministic for
//! a given pair of snapshots.

use crate::event::{Event, Op};
use crate::record::FileRecord;
use crate::snapshot::Snapshot;
use std::collections::BTreeMap;
use std::path::Path;

/// Classify the changes between two snapshots
///
/// Emission order: renames, creates, removes, writes, chmods. A chmod seen
/// across a rename is reported against the pre-rename path, after the
/// in-place chmods.
pub fn classify(previous: &Snapshot, current: &Snapshot) -> Vec<Event> {
    let mut created: Vec<&FileRecord> = current
        .iter()
        .filter(|record| !previous.contains(record.path()))
        .collect();

    // Removed paths grouped by parent; renames never cross directories.
    let mut removed: BTreeMap<Option<&Path>, Vec<&FileRecord>> = BTreeMap::new();
    for record in previous.iter().filter(|r| !current.contains(r.path())) {
        removed.entry(record.parent()).or_default().push(record);
    }

    let mut events = Vec::new();
    let mut rename_chmods = Vec::new();

    created.retain(|to| {
        let Some(candidates) = removed.get_mut(&to.parent()) else {
            return true;
        };
        let Some(idx) = candidates.iter().position(|from| is_same_file(from, to)) else {
            return true;
        };
        let from = candidates.remove(idx);

        events.push(Event::rename(from.path(), (*to).clone()));
        if from.mode() != to.mode() {
            rename_chmods.push(Event::new(Op::Chmod, from.path(), (*to).clone()));
        }
        false
    });

    events.extend(
        created
            .into_iter()
            .map(|record| Event::for_record(Op::Create, record.clone())),
    );

    let mut removed: Vec<&FileRecord> = removed.into_values().flatten().collect();
    removed.sort_by(|a, b| a.path().cmp(b.path()));
    events.extend(
        removed
            .into_iter()
            .map(|record| Event::for_record(Op::Remove, record.clone())),
    );

    let mut chmods = Vec::new();
    for record in current.iter() {
        let Some(before) = previous.get(record.path()) else {
            continue;
        };
        if !record.is_dir() && before.modified() != record.modified() {
            events.push(Event::for_record(Op::Write, record.clone()));
        }
        if before.mode() != record.mode() {
            chmods.push(Event::for_record(Op::Chmod, record.clone()));
        }
    }

    events.extend(chmods);
    events.extend(rename_chmods);
    events
}

/// Whether `to` is `from` under a new name
///
/// Identity tokens are authoritative when both records have one. Otherwise
/// the records must agree on kind, size, mtime and mode; unrelated files with
/// identical metadata are indistinguishable from a rename.
fn is_same_file(from: &FileRecord, to: &FileRecord) -> bool {
    if from.is_dir() != to.is_dir() {
        return false;
    }
    match (from.identity(), to.identity()) {
        (Some(a), Some(b)) => a == b,
        _ => {
            from.size() == to.size()
                && from.modified() == to.modified()
                && from.mode() == to.mode()
        }
    }
}
