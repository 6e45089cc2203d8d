use crate::GcResult;
use crate::HeapStats;
use crate::collector::CollectStats;
use crate::config::HeapConfig;
use crate::handle::Gc;
use crate::node::{NodeKey, NodeRecord, addr_key};
use crate::registry::Registry;
use crate::release::{BoxRelease, Exclusive, Release};
use crate::roots::{RootSet, RootSlot};
use crate::trace::{Trace, Tracer};
use log::{debug, trace, warn};
use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

/// Collector state shared between a [`Heap`] and its handles.
pub(crate) struct HeapInner {
    pub(crate) registry: Registry,
    pub(crate) roots: RootSet,
    pub(crate) collecting: Cell<bool>,
    pub(crate) enabled: Cell<bool>,
    pub(crate) debug_flags: Cell<u32>,
    pub(crate) collections: Cell<usize>,
    pub(crate) destroyed: Cell<usize>,
    pub(crate) last_collection: Cell<CollectStats>,
    next_zero_sized: Cell<u64>,
    teardown_on_drop: bool,
}

impl HeapInner {
    fn new(config: HeapConfig) -> Self {
        Self {
            registry: Registry::with_capacity(config.initial_capacity),
            roots: RootSet::with_capacity(config.initial_capacity),
            collecting: Cell::new(false),
            enabled: Cell::new(config.enabled),
            debug_flags: Cell::new(config.debug),
            collections: Cell::new(0),
            destroyed: Cell::new(0),
            last_collection: Cell::new(CollectStats::default()),
            next_zero_sized: Cell::new(0),
            teardown_on_drop: config.teardown_on_drop,
        }
    }

    /// Track the allocation at `ptr`, or return its existing record.
    ///
    /// The value is traced once first so that any handle fields built as
    /// roots stop being roots: from now on they are reachable only through
    /// this allocation.
    ///
    /// Zero-sized values all live at the same dangling address, so every
    /// registration of one is a new allocation with its own record.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` whose ownership is handed to the
    /// collector, and `release` must be the correct way to free it.
    pub(crate) unsafe fn register<T, R>(&self, ptr: NonNull<T>, release: R) -> Rc<NodeRecord>
    where
        T: Trace + 'static,
        R: Release<T>,
    {
        let mut stripped = 0usize;
        {
            // SAFETY: the caller guarantees `ptr` is live.
            let value = unsafe { ptr.as_ref() };
            let mut unroot = |slot: &RootSlot| {
                if self.roots.unregister(slot) {
                    stripped += 1;
                }
            };
            value.trace(&mut Tracer::new(&mut unroot));
        }

        let key = if std::mem::size_of::<T>() == 0 {
            let serial = self.next_zero_sized.get();
            self.next_zero_sized.set(serial + 1);
            NodeKey::ZeroSized(serial)
        } else {
            addr_key(ptr)
        };
        let (record, inserted) = self
            .registry
            .get_or_insert_with(key, || NodeRecord::new(key, ptr, release));
        if inserted {
            trace!(
                "gc: tracking {} at {key}, {stripped} nested roots stripped",
                record.type_name()
            );
        } else {
            trace!("gc: {key} already tracked as {}", record.type_name());
        }
        record
    }
}

impl Drop for HeapInner {
    fn drop(&mut self) {
        self.roots.clear();

        if !self.teardown_on_drop {
            debug!(
                "gc: heap dropped, leaking {} tracked allocations",
                self.registry.len()
            );
            return;
        }

        let mut destroyed = 0usize;
        while !self.registry.is_empty() {
            for record in self.registry.drain() {
                if record.destroy() {
                    destroyed += 1;
                }
            }
        }
        debug!("gc: heap torn down, {destroyed} allocations destroyed");
    }
}

/// A garbage-collected heap: the registry of tracked allocations, the root
/// set, and the collection trigger.
///
/// Handles keep only a weak reference back to their heap. Dropping the heap
/// destroys everything still tracked (see [`HeapConfig::teardown_on_drop`]).
pub struct Heap {
    inner: Rc<HeapInner>,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            inner: Rc::new(HeapInner::new(config)),
        }
    }

    fn weak(&self) -> Weak<HeapInner> {
        Rc::downgrade(&self.inner)
    }

    /// A null handle; a root unless built inside [`Heap::make`].
    pub fn null<T: ?Sized>(&self) -> Gc<T> {
        Gc::from_parts(self.weak(), None, None)
    }

    /// Allocate a value built by `ctor` and return a root handle to it.
    ///
    /// Root registration is suspended while `ctor` runs, so handles stored
    /// in the new value are reachable only through it.
    pub fn make<T, F>(&self, ctor: F) -> Gc<T>
    where
        T: Trace + 'static,
        F: FnOnce(&Heap) -> T,
    {
        let value = {
            let _pause = self.inner.roots.pause();
            ctor(self)
        };
        self.adopt(Box::new(value))
    }

    /// Box an already built value and track it.
    pub fn alloc<T: Trace + 'static>(&self, value: T) -> Gc<T> {
        self.adopt(Box::new(value))
    }

    /// Take over an exclusively owned pointer together with its release strategy.
    pub fn adopt<P: Exclusive>(&self, owned: P) -> Gc<P::Target> {
        let (ptr, release) = owned.into_raw_parts();
        // SAFETY: `Exclusive` guarantees the pointer is owned and paired with
        // its release strategy.
        unsafe { self.from_raw_with(ptr, release) }
    }

    /// Track `ptr`, freeing it through `Box` once unreachable.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::into_raw`, and nothing else may
    /// free it.
    pub unsafe fn from_raw<T: Trace + 'static>(&self, ptr: *mut T) -> Gc<T> {
        // SAFETY: forwarded from the caller.
        unsafe { self.from_raw_with(ptr, BoxRelease) }
    }

    /// Track `ptr`, freeing it with `release` once unreachable.
    ///
    /// Registering an address that is already tracked reuses the existing
    /// record and discards `release`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live `T` that nothing else frees,
    /// and `release` must be the correct way to free it.
    pub unsafe fn from_raw_with<T, R>(&self, ptr: *mut T, release: R) -> Gc<T>
    where
        T: Trace + 'static,
        R: Release<T>,
    {
        match NonNull::new(ptr) {
            Some(target) => {
                // SAFETY: forwarded from the caller.
                let record = unsafe { self.inner.register(target, release) };
                Gc::from_parts(self.weak(), Some(target), Some(record))
            }
            None => self.null(),
        }
    }

    /// Run mark and sweep until a round destroys nothing.
    ///
    /// A re-entrant call from inside a destructor is skipped with a warning.
    ///
    /// References obtained from a handle before the call are not kept alive
    /// by it. If the handle was cleared or retargeted in the meantime, its
    /// old target may be freed here and such a reference dangles. Borrow
    /// again after collecting:
    ///
    /// ```
    /// use cycle_gc::Heap;
    ///
    /// let heap = Heap::new();
    /// let name = heap.alloc(String::from("kept"));
    /// let other = name.clone();
    /// name.clear();
    ///
    /// heap.collect();
    /// assert_eq!(other.try_get().map(String::as_str), Ok("kept"));
    /// assert!(name.try_get().is_err());
    /// ```
    pub fn collect(&self) -> CollectStats {
        match self.try_collect() {
            Ok(stats) => stats,
            Err(err) => {
                warn!("gc: collection skipped: {err}");
                CollectStats::default()
            }
        }
    }

    pub fn try_collect(&self) -> GcResult<CollectStats> {
        if !self.inner.enabled.get() {
            return Ok(CollectStats::default());
        }
        self.inner.collect()
    }

    pub fn enable(&self) {
        self.inner.enabled.set(true);
    }

    pub fn disable(&self) {
        self.inner.enabled.set(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    pub fn set_debug(&self, flags: u32) {
        self.inner.debug_flags.set(flags);
    }

    pub fn get_debug(&self) -> u32 {
        self.inner.debug_flags.get()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn root_count(&self) -> usize {
        self.inner.roots.len()
    }

    /// Whether newly constructed handles currently join the root set.
    pub fn is_rooting(&self) -> bool {
        self.inner.roots.is_rooting()
    }

    pub fn is_root<T: ?Sized>(&self, handle: &Gc<T>) -> bool {
        self.inner.roots.contains(handle.slot())
    }

    pub fn is_tracked<T: ?Sized>(&self, handle: &Gc<T>) -> bool {
        handle
            .slot()
            .record()
            .is_some_and(|record| record.is_live() && self.inner.registry.contains(record.key()))
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            tracked: self.inner.registry.len(),
            roots: self.inner.roots.len(),
            collections: self.inner.collections.get(),
            destroyed: self.inner.destroyed.get(),
            last_collection: self.inner.last_collection.get(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("tracked", &self.tracked_count())
            .field("roots", &self.root_count())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// A lazily created heap per thread, for code that prefers free functions
/// over passing a [`Heap`] around.
pub mod global {
    use super::*;

    thread_local! {
        static HEAP: Heap = Heap::new();
    }

    pub fn with_heap<R>(f: impl FnOnce(&Heap) -> R) -> R {
        HEAP.with(f)
    }

    pub fn null<T: ?Sized>() -> Gc<T> {
        with_heap(|heap| heap.null())
    }

    pub fn make<T, F>(ctor: F) -> Gc<T>
    where
        T: Trace + 'static,
        F: FnOnce(&Heap) -> T,
    {
        with_heap(|heap| heap.make(ctor))
    }

    pub fn alloc<T: Trace + 'static>(value: T) -> Gc<T> {
        with_heap(|heap| heap.alloc(value))
    }

    pub fn adopt<P: Exclusive>(owned: P) -> Gc<P::Target> {
        with_heap(|heap| heap.adopt(owned))
    }

    pub fn collect() -> CollectStats {
        with_heap(|heap| heap.collect())
    }

    pub fn get_stats() -> HeapStats {
        with_heap(|heap| heap.stats())
    }
}
