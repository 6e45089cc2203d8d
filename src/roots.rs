use crate::node::NodeRecord;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Stable identity of one handle.
///
/// A `Gc` moves freely, so the root set cannot key on the handle itself. The
/// slot lives behind an `Rc` and never moves; its address is the handle's
/// identity and its contents track whatever the handle currently targets.
#[derive(Debug, Default)]
pub(crate) struct RootSlot {
    record: RefCell<Option<Rc<NodeRecord>>>,
}

impl RootSlot {
    pub(crate) fn new(record: Option<Rc<NodeRecord>>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(record),
        })
    }

    pub(crate) fn id(&self) -> usize {
        self as *const Self as usize
    }

    pub(crate) fn record(&self) -> Option<Rc<NodeRecord>> {
        self.record.borrow().clone()
    }

    /// Whether the current target has a record that has not been destroyed.
    pub(crate) fn is_live(&self) -> bool {
        self.record.borrow().as_ref().is_some_and(|record| record.is_live())
    }

    pub(crate) fn set_record(&self, record: Option<Rc<NodeRecord>>) {
        let previous = self.record.replace(record);
        drop(previous);
    }

    pub(crate) fn take_record(&self) -> Option<Rc<NodeRecord>> {
        self.record.take()
    }

    pub(crate) fn swap(&self, other: &RootSlot) {
        if self.id() != other.id() {
            self.record.swap(&other.record);
        }
    }
}

/// Handles that are reachable unconditionally, plus the switch deciding
/// whether newly constructed handles join them.
#[derive(Debug)]
pub(crate) struct RootSet {
    slots: RefCell<HashMap<usize, Rc<RootSlot>>>,
    rooting: Cell<bool>,
}

impl RootSet {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RefCell::new(HashMap::with_capacity(capacity)),
            rooting: Cell::new(true),
        }
    }

    /// Adds `slot` if root registration is active. Returns whether it was added.
    pub(crate) fn register(&self, slot: &Rc<RootSlot>) -> bool {
        if !self.rooting.get() {
            return false;
        }
        self.slots.borrow_mut().insert(slot.id(), Rc::clone(slot));
        true
    }

    pub(crate) fn unregister(&self, slot: &RootSlot) -> bool {
        let removed = self.slots.borrow_mut().remove(&slot.id());
        removed.is_some()
    }

    pub(crate) fn contains(&self, slot: &RootSlot) -> bool {
        self.slots.borrow().contains_key(&slot.id())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub(crate) fn is_rooting(&self) -> bool {
        self.rooting.get()
    }

    /// Turns root registration off until the returned guard is dropped.
    pub(crate) fn pause(&self) -> RootingPause<'_> {
        let previous = self.rooting.replace(false);
        RootingPause {
            roots: self,
            previous,
        }
    }

    /// Current targets of every root, for the mark phase.
    pub(crate) fn records(&self) -> Vec<Rc<NodeRecord>> {
        self.slots
            .borrow()
            .values()
            .filter_map(|slot| slot.record())
            .collect()
    }

    pub(crate) fn clear(&self) {
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        drop(slots);
    }
}

pub(crate) struct RootingPause<'a> {
    roots: &'a RootSet,
    previous: bool,
}

impl Drop for RootingPause<'_> {
    fn drop(&mut self) {
        self.roots.rooting.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_respects_flag() {
        let roots = RootSet::with_capacity(4);
        let slot = RootSlot::new(None);

        assert!(roots.is_rooting());
        assert!(roots.register(&slot));
        assert!(roots.contains(&slot));
        assert_eq!(roots.len(), 1);

        let other = RootSlot::new(None);
        {
            let _pause = roots.pause();
            assert!(!roots.is_rooting());
            assert!(!roots.register(&other));
        }
        assert!(roots.is_rooting());
        assert!(!roots.contains(&other));
    }

    #[test]
    fn test_nested_pause_restores_outer_state() {
        let roots = RootSet::with_capacity(0);
        let outer = roots.pause();
        {
            let _inner = roots.pause();
            assert!(!roots.is_rooting());
        }
        assert!(!roots.is_rooting());
        drop(outer);
        assert!(roots.is_rooting());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let roots = RootSet::with_capacity(0);
        let slot = RootSlot::new(None);
        roots.register(&slot);

        assert!(roots.unregister(&slot));
        assert!(!roots.unregister(&slot));
        assert_eq!(roots.len(), 0);
    }

    #[test]
    fn test_records_skip_null_roots() {
        let roots = RootSet::with_capacity(0);
        roots.register(&RootSlot::new(None));
        assert_eq!(roots.len(), 1);
        assert!(roots.records().is_empty());

        roots.clear();
        assert_eq!(roots.len(), 0);
    }
}
