use crate::node::{NodeKey, NodeRecord};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Every tracked allocation, keyed by its raw address (or serial, for
/// zero-sized values).
#[derive(Debug)]
pub(crate) struct Registry {
    nodes: RefCell<HashMap<NodeKey, Rc<NodeRecord>>>,
}

impl Registry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RefCell::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Returns the record for `key`, creating it with `make` on first sight.
    /// The flag is `true` when the record is new.
    pub(crate) fn get_or_insert_with(
        &self,
        key: NodeKey,
        make: impl FnOnce() -> NodeRecord,
    ) -> (Rc<NodeRecord>, bool) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(existing) = nodes.get(&key) {
            return (Rc::clone(existing), false);
        }
        let record = Rc::new(make());
        nodes.insert(key, Rc::clone(&record));
        (record, true)
    }

    pub(crate) fn contains(&self, key: NodeKey) -> bool {
        self.nodes.borrow().contains_key(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    pub(crate) fn clear_marks(&self) {
        for record in self.nodes.borrow().values() {
            record.unmark();
        }
    }

    /// Keys whose mark bit is clear right now.
    pub(crate) fn unmarked(&self) -> Vec<NodeKey> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, record)| !record.is_marked())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Removes `key` only if it is still unmarked.
    pub(crate) fn remove_unmarked(&self, key: NodeKey) -> Option<Rc<NodeRecord>> {
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(&key) {
            Some(record) if !record.is_marked() => nodes.remove(&key),
            _ => None,
        }
    }

    pub(crate) fn drain(&self) -> Vec<Rc<NodeRecord>> {
        self.nodes.borrow_mut().drain().map(|(_, record)| record).collect()
    }
}
