//! Release strategies for tracked allocations.

use crate::trace::Trace;
use std::fmt;
use std::mem::ManuallyDrop;

/// Frees one tracked allocation once the collector has decided it is dead.
///
/// Any `FnOnce(*mut T)` closure is a release strategy.
pub trait Release<T>: 'static {
    /// # Safety
    ///
    /// `ptr` must be the allocation this strategy was paired with, and it
    /// must not be used or released again afterwards.
    unsafe fn release(self, ptr: *mut T);
}

impl<T, F> Release<T> for F
where
    F: FnOnce(*mut T) + 'static,
{
    unsafe fn release(self, ptr: *mut T) {
        self(ptr)
    }
}

/// Default strategy: the pointer came from `Box::into_raw` and is dropped
/// through `Box::from_raw`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxRelease;

impl<T> Release<T> for BoxRelease {
    unsafe fn release(self, ptr: *mut T) {
        if !ptr.is_null() {
            // SAFETY: the caller pairs `BoxRelease` only with pointers that
            // came from `Box::into_raw`.
            unsafe { drop(Box::from_raw(ptr)) }
        }
    }
}

/// An exclusively-owned pointer paired with the strategy that frees it.
///
/// Dropping a `Unique` that was never adopted releases the pointer.
pub struct Unique<T, R: Release<T> = BoxRelease> {
    ptr: *mut T,
    release: ManuallyDrop<R>,
}

impl<T> Unique<T, BoxRelease> {
    pub fn new(value: T) -> Self {
        Self {
            ptr: Box::into_raw(Box::new(value)),
            release: ManuallyDrop::new(BoxRelease),
        }
    }
}

impl<T, R: Release<T>> Unique<T, R> {
    /// Take ownership of `ptr`, to be freed by `release`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or valid for reads and writes, owned by nobody
    /// else, and `release` must be the correct way to free it.
    pub unsafe fn from_raw(ptr: *mut T, release: R) -> Self {
        Self {
            ptr,
            release: ManuallyDrop::new(release),
        }
    }

    pub fn get(&self) -> *mut T {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: a non-null pointer is exclusively owned and valid per `from_raw`.
        unsafe { self.ptr.as_ref() }
    }

    /// Give up ownership without releasing.
    pub fn into_raw_parts(self) -> (*mut T, R) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `release` is taken exactly once.
        let release = unsafe { ManuallyDrop::take(&mut this.release) };
        (this.ptr, release)
    }
}

impl<T, R: Release<T>> Drop for Unique<T, R> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            // SAFETY: the field is not used after this point.
            unsafe { ManuallyDrop::drop(&mut self.release) };
            return;
        }
        // SAFETY: the field is not used after this point, and `ptr` is owned
        // exclusively by this `Unique`.
        unsafe {
            let release = ManuallyDrop::take(&mut self.release);
            release.release(self.ptr);
        }
    }
}

impl<T: fmt::Debug, R: Release<T>> fmt::Debug for Unique<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_ref() {
            Some(value) => f.debug_tuple("Unique").field(value).finish(),
            None => f.write_str("Unique(null)"),
        }
    }
}

/// An owner that can hand its pointer and release strategy to the collector.
///
/// # Safety
///
/// `into_raw_parts` must return a pointer that is null or exclusively owned
/// and valid, together with the strategy that correctly frees it.
pub unsafe trait Exclusive {
    type Target: Trace + 'static;
    type Release: Release<Self::Target>;

    fn into_raw_parts(self) -> (*mut Self::Target, Self::Release);
}

unsafe impl<T: Trace + 'static> Exclusive for Box<T> {
    type Target = T;
    type Release = BoxRelease;

    fn into_raw_parts(self) -> (*mut T, BoxRelease) {
        (Box::into_raw(self), BoxRelease)
    }
}

unsafe impl<T: Trace + 'static, R: Release<T>> Exclusive for Unique<T, R> {
    type Target = T;
    type Release = R;

    fn into_raw_parts(self) -> (*mut T, R) {
        Unique::into_raw_parts(self)
    }
}
