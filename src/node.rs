use crate::release::Release;
use crate::roots::RootSlot;
use crate::trace::{Trace, Tracer};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Type-erased operations of one tracked allocation.
pub(crate) trait NodeOps {
    /// # Safety
    ///
    /// `addr` must be the live allocation these operations were built for.
    unsafe fn trace(&self, addr: NonNull<()>, tracer: &mut Tracer<'_>);

    /// # Safety
    ///
    /// `addr` must be the live allocation these operations were built for;
    /// it is dangling afterwards.
    unsafe fn destroy(self: Box<Self>, addr: NonNull<()>);
}

struct TypedOps<T, R> {
    release: R,
    _marker: PhantomData<fn(*mut T)>,
}

impl<T, R> NodeOps for TypedOps<T, R>
where
    T: Trace + 'static,
    R: Release<T>,
{
    unsafe fn trace(&self, addr: NonNull<()>, tracer: &mut Tracer<'_>) {
        // SAFETY: the caller guarantees `addr` is a live `T`.
        let value = unsafe { addr.cast::<T>().as_ref() };
        Trace::trace(value, tracer);
    }

    unsafe fn destroy(self: Box<Self>, addr: NonNull<()>) {
        // SAFETY: the caller guarantees `addr` is the allocation paired with
        // `release` and never touches it again.
        unsafe { self.release.release(addr.cast::<T>().as_ptr()) }
    }
}

/// Registry key of one tracked allocation.
///
/// Sized values are keyed by address. Every zero-sized `Box` shares the same
/// dangling address, so each zero-sized registration gets a fresh serial
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeKey {
    Addr(usize),
    ZeroSized(u64),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Addr(addr) => write!(f, "{addr:#x}"),
            NodeKey::ZeroSized(serial) => write!(f, "zst#{serial}"),
        }
    }
}

/// Registry entry for one tracked allocation.
pub(crate) struct NodeRecord {
    key: NodeKey,
    addr: NonNull<()>,
    type_name: &'static str,
    marked: Cell<bool>,
    ops: RefCell<Option<Box<dyn NodeOps>>>,
}

impl NodeRecord {
    pub(crate) fn new<T, R>(key: NodeKey, ptr: NonNull<T>, release: R) -> Self
    where
        T: Trace + 'static,
        R: Release<T>,
    {
        let ops: Box<dyn NodeOps> = Box::new(TypedOps::<T, R> {
            release,
            _marker: PhantomData,
        });
        Self {
            key,
            addr: ptr.cast(),
            type_name: std::any::type_name::<T>(),
            marked: Cell::new(false),
            ops: RefCell::new(Some(ops)),
        }
    }

    pub(crate) fn key(&self) -> NodeKey {
        self.key
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.marked.get()
    }

    pub(crate) fn unmark(&self) {
        self.marked.set(false);
    }

    /// Sets the mark bit. Returns `true` only for the call that flipped it.
    pub(crate) fn try_mark(&self) -> bool {
        !self.marked.replace(true)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.ops.borrow().is_some()
    }

    /// Reports every handle field of the allocation. No-op once destroyed.
    pub(crate) fn trace(&self, sink: &mut dyn FnMut(&RootSlot)) {
        let ops = self.ops.borrow();
        if let Some(ops) = ops.as_ref() {
            // SAFETY: ops are present only while the allocation is live.
            unsafe { NodeOps::trace(&**ops, self.addr, &mut Tracer::new(sink)) };
        }
    }

    /// Runs the release strategy. Returns `false` if already destroyed.
    pub(crate) fn destroy(&self) -> bool {
        let ops = self.ops.borrow_mut().take();
        match ops {
            Some(ops) => {
                // SAFETY: ops were just taken out, so this is the only call
                // that can ever release `addr`.
                unsafe { ops.destroy(self.addr) };
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRecord")
            .field("key", &self.key)
            .field("addr", &self.addr)
            .field("type_name", &self.type_name)
            .field("marked", &self.marked.get())
            .field("live", &self.is_live())
            .finish()
    }
}

pub(crate) fn addr_key<T>(ptr: NonNull<T>) -> NodeKey {
    NodeKey::Addr(ptr.as_ptr() as *mut () as usize)
}
