use crate::GcResult;
use crate::error::GcError;
use crate::gc::HeapInner;
use crate::node::NodeRecord;
use crate::release::{BoxRelease, Exclusive, Release};
use crate::roots::RootSlot;
use crate::trace::Trace;
use log::{trace, warn};
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

/// A typed reference into a collected heap.
///
/// A `Gc` never frees its target. Whether the target lives is decided by
/// the next collection, based on reachability from root handles. A handle
/// built outside [`Heap::make`](crate::Heap::make) is a root until dropped;
/// handles stored inside tracked values are reached through their owner.
///
/// All mutators take `&self`, so handle fields of a tracked value can be
/// retargeted through a shared reference.
///
/// Access checks that the target has not been destroyed, by a collection
/// or by the heap's teardown. A reference obtained through `Deref` is not
/// re-checked, though: holding one across a collection that frees the
/// target is a use-after-free, the same as holding a pointer into a
/// dropped value. See [`Heap::collect`](crate::Heap::collect).
pub struct Gc<T: ?Sized> {
    ptr: Cell<Option<NonNull<T>>>,
    slot: Rc<RootSlot>,
    heap: Weak<HeapInner>,
}

impl<T: ?Sized> Gc<T> {
    pub(crate) fn from_parts(
        heap: Weak<HeapInner>,
        ptr: Option<NonNull<T>>,
        record: Option<Rc<NodeRecord>>,
    ) -> Self {
        let slot = RootSlot::new(record);
        if let Some(inner) = heap.upgrade() {
            if inner.roots.register(&slot) {
                trace!("gc: handle {:#x} rooted", slot.id());
            }
        }
        Self {
            ptr: Cell::new(ptr),
            slot,
            heap,
        }
    }

    pub(crate) fn slot(&self) -> &RootSlot {
        &self.slot
    }

    fn attached_heap(&self) -> GcResult<Rc<HeapInner>> {
        self.heap.upgrade().ok_or(GcError::HeapDropped)
    }

    fn addr(&self) -> *const () {
        match self.ptr.get() {
            Some(ptr) => ptr.as_ptr().cast::<()>().cast_const(),
            None => std::ptr::null(),
        }
    }

    /// Whether the heap this handle belongs to is still alive.
    pub fn is_attached(&self) -> bool {
        self.heap.strong_count() > 0
    }

    pub fn as_non_null(&self) -> Option<NonNull<T>> {
        self.ptr.get()
    }

    pub fn is_some(&self) -> bool {
        self.ptr.get().is_some()
    }

    pub fn is_null(&self) -> bool {
        self.ptr.get().is_none()
    }

    /// Whether the target exists and has not been destroyed.
    pub fn is_live(&self) -> bool {
        self.ptr.get().is_some() && self.slot.is_live()
    }

    pub fn as_ref(&self) -> Option<&T> {
        self.try_get().ok()
    }

    pub fn try_get(&self) -> GcResult<&T> {
        let ptr = self.ptr.get().ok_or(GcError::NullHandle)?;
        if !self.slot.is_live() {
            return Err(GcError::TargetDestroyed);
        }
        // SAFETY: the record is live, so the allocation has not been
        // released.
        Ok(unsafe { ptr.as_ref() })
    }

    pub fn ptr_eq(a: &Gc<T>, b: &Gc<T>) -> bool {
        std::ptr::eq(a.addr(), b.addr())
    }

    /// Point at `other`'s target. Root status is unchanged.
    pub fn set(&self, other: &Gc<T>) {
        let record = other.slot.record();
        self.ptr.set(other.ptr.get());
        self.slot.set_record(record);
    }

    /// Move `other`'s target into this handle and null `other`.
    /// Root status of both handles is unchanged.
    pub fn set_from(&self, other: &Gc<T>) {
        if Rc::ptr_eq(&self.slot, &other.slot) {
            return;
        }
        let record = other.slot.take_record();
        self.ptr.set(other.ptr.take());
        self.slot.set_record(record);
    }

    /// Move the target into a new handle, leaving this one null. The new
    /// handle is a root unless built inside [`Heap::make`](crate::Heap::make).
    pub fn take(&self) -> Gc<T> {
        let record = self.slot.take_record();
        Gc::from_parts(self.heap.clone(), self.ptr.take(), record)
    }

    pub fn clear(&self) {
        self.ptr.set(None);
        self.slot.set_record(None);
    }

    pub fn swap(&self, other: &Gc<T>) {
        if Rc::ptr_eq(&self.slot, &other.slot) {
            return;
        }
        self.ptr.swap(&other.ptr);
        self.slot.swap(&other.slot);
    }

    /// A new handle to a part or an unsized view of this handle's target,
    /// keeping the same allocation alive.
    ///
    /// ```
    /// use cycle_gc::{Gc, Heap};
    /// use std::fmt::Display;
    ///
    /// fn label(pair: &(u32, String)) -> &(dyn Display + 'static) {
    ///     &pair.1
    /// }
    ///
    /// let heap = Heap::new();
    /// let pair = heap.alloc((7u32, String::from("seven")));
    ///
    /// let shown: Gc<dyn Display> = pair.map(label);
    /// drop(pair);
    /// heap.collect();
    /// assert_eq!(shown.to_string(), "seven");
    /// ```
    ///
    /// A null or destroyed handle maps to a null handle.
    pub fn map<U: ?Sized>(&self, project: fn(&T) -> &U) -> Gc<U> {
        match self.try_get() {
            Ok(value) => Gc::from_parts(
                self.heap.clone(),
                Some(NonNull::from(project(value))),
                self.slot.record(),
            ),
            Err(_) => Gc::from_parts(self.heap.clone(), None, None),
        }
    }
}

impl<T> Gc<T> {
    /// The raw target, null for a null handle.
    pub fn get(&self) -> *mut T {
        self.ptr.get().map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }
}

impl<T: Trace + 'static> Gc<T> {
    /// Retarget to `ptr`, freed through `Box` once unreachable.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::into_raw`, and nothing else may
    /// free it.
    pub unsafe fn reset(&self, ptr: *mut T) {
        // SAFETY: forwarded from the caller.
        unsafe { self.reset_with(ptr, BoxRelease) }
    }

    /// Retarget to `ptr`, freed with `release` once unreachable.
    ///
    /// If the heap is gone the allocation cannot be tracked: it is released
    /// immediately and the handle is left null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live `T` that nothing else frees,
    /// and `release` must be the correct way to free it.
    pub unsafe fn reset_with<R: Release<T>>(&self, ptr: *mut T, release: R) {
        let Some(target) = NonNull::new(ptr) else {
            self.clear();
            return;
        };
        match self.attached_heap() {
            Ok(inner) => {
                // SAFETY: forwarded from the caller.
                let record = unsafe { inner.register(target, release) };
                self.ptr.set(Some(target));
                self.slot.set_record(Some(record));
            }
            Err(err) => {
                warn!("gc: cannot track {ptr:p}: {err}; releasing it");
                self.clear();
                // SAFETY: the allocation was handed over and is not tracked
                // anywhere, so this is its only release.
                unsafe { release.release(ptr) };
            }
        }
    }

    /// Retarget to an exclusively owned pointer, keeping its release strategy.
    pub fn set_owned<P: Exclusive<Target = T>>(&self, owned: P) {
        let (ptr, release) = owned.into_raw_parts();
        // SAFETY: `Exclusive` guarantees the pointer is owned and paired with
        // its release strategy.
        unsafe { self.reset_with(ptr, release) }
    }
}

impl<T: ?Sized> Clone for Gc<T> {
    /// A new handle to the same target; a root unless built inside
    /// [`Heap::make`](crate::Heap::make).
    fn clone(&self) -> Self {
        Gc::from_parts(self.heap.clone(), self.ptr.get(), self.slot.record())
    }
}

impl<T: ?Sized> Drop for Gc<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.heap.upgrade() {
            if inner.roots.unregister(&self.slot) {
                trace!("gc: handle {:#x} unrooted", self.slot.id());
            }
        }
    }
}

impl<T: ?Sized> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Gc<T> {
    // Only the address: following the target could loop forever on a cycle.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Gc(null)")
        } else {
            write!(f, "Gc({:p})", self.addr())
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
