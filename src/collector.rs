//! Mark and sweep over the registry, repeated to a fixpoint.
//!
//! Destructors run during a sweep may allocate, drop roots, or re-root
//! things, so the reachability computed before a sweep can be stale right
//! after it. Every collection therefore repeats reset, mark and sweep until
//! a round destroys nothing.

use crate::GcResult;
use crate::config::{DEBUG_COLLECTABLE, DEBUG_STATS};
use crate::error::GcError;
use crate::gc::HeapInner;
use crate::node::NodeRecord;
use crate::roots::RootSlot;
use log::{debug, info};
use std::cell::Cell;
use std::rc::Rc;

/// Outcome of one call to [`Heap::collect`](crate::Heap::collect).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Mark/sweep rounds run, including the final round that destroyed nothing.
    pub rounds: usize,
    /// Allocations found reachable in the final round.
    pub marked: usize,
    /// Allocations destroyed across all rounds.
    pub destroyed: usize,
}

struct CollectingGuard<'a>(&'a Cell<bool>);

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl HeapInner {
    pub(crate) fn collect(&self) -> GcResult<CollectStats> {
        if self.collecting.replace(true) {
            return Err(GcError::CollectionInProgress);
        }
        let _guard = CollectingGuard(&self.collecting);

        let mut stats = CollectStats::default();
        loop {
            stats.rounds += 1;
            self.registry.clear_marks();
            stats.marked = self.mark_roots();
            let destroyed = self.sweep();
            stats.destroyed += destroyed;

            debug!(
                "gc: round {}: {} marked, {} destroyed, {} tracked",
                stats.rounds,
                stats.marked,
                destroyed,
                self.registry.len()
            );

            if destroyed == 0 {
                break;
            }
        }

        self.collections.set(self.collections.get() + 1);
        self.destroyed.set(self.destroyed.get() + stats.destroyed);
        self.last_collection.set(stats);

        if self.debug_flags.get() & DEBUG_STATS != 0 {
            info!(
                "gc: collection {} done: {} rounds, {} reachable, {} destroyed",
                self.collections.get(),
                stats.rounds,
                stats.marked,
                stats.destroyed
            );
        }

        Ok(stats)
    }

    /// Marks everything reachable from the root set. Returns the number of
    /// records marked.
    fn mark_roots(&self) -> usize {
        let mut marked = 0usize;
        let mut worklist: Vec<Rc<NodeRecord>> = Vec::new();

        for record in self.roots.records() {
            if record.is_live() && record.try_mark() {
                marked += 1;
                worklist.push(record);
            }
        }

        while let Some(record) = worklist.pop() {
            record.trace(&mut |slot: &RootSlot| {
                if let Some(child) = slot.record() {
                    if child.is_live() && child.try_mark() {
                        marked += 1;
                        worklist.push(child);
                    }
                }
            });
        }

        marked
    }

    /// Destroys every record left unmarked. Each record leaves the registry
    /// before its destructor runs, so it can never be destroyed twice.
    fn sweep(&self) -> usize {
        let log_each = self.debug_flags.get() & DEBUG_COLLECTABLE != 0;
        let mut destroyed = 0usize;

        for key in self.registry.unmarked() {
            let Some(record) = self.registry.remove_unmarked(key) else {
                continue;
            };
            if log_each {
                info!("gc: collectable {} at {key}", record.type_name());
            }
            if record.destroy() {
                destroyed += 1;
            }
        }

        destroyed
    }
}
