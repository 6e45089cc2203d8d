//! Per-type traversal declarations.
//!
//! The collector has no compile-time knowledge of the types it manages. It
//! discovers the edges of the object graph by asking each tracked value to
//! report its handle fields through [`Trace::trace`].

use crate::handle::Gc;
use crate::roots::RootSlot;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::marker::PhantomData;
use std::rc::Rc;

/// Enumerates the [`Gc`] handles owned by a value.
///
/// # Safety
///
/// The implementation must be total: every handle reachable through the
/// value, directly or through nested values it owns, has to be reported to
/// the tracer. A handle that is not reported is invisible to the collector
/// and its target may be destroyed while still referenced.
pub unsafe trait Trace {
    fn trace(&self, tracer: &mut Tracer<'_>);
}

/// Callback handed to [`Trace::trace`]; receives one call per handle field.
pub struct Tracer<'a> {
    sink: &'a mut dyn FnMut(&RootSlot),
}

impl<'a> Tracer<'a> {
    pub(crate) fn new(sink: &'a mut dyn FnMut(&RootSlot)) -> Self {
        Self { sink }
    }

    /// Report a single handle field.
    pub fn visit<T: ?Sized>(&mut self, handle: &Gc<T>) {
        (self.sink)(handle.slot());
    }
}

unsafe impl<T: ?Sized> Trace for Gc<T> {
    #[inline]
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.visit(self);
    }
}

macro_rules! empty_trace {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl Trace for $ty {
                #[inline]
                fn trace(&self, _tracer: &mut Tracer<'_>) {}
            }
        )*
    };
}

empty_trace!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    String,
);

// Non-owning pointers never keep their target alive.
unsafe impl<T: ?Sized> Trace for *const T {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

unsafe impl<T: ?Sized> Trace for *mut T {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

unsafe impl<T: ?Sized> Trace for &T {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

unsafe impl<T: ?Sized> Trace for PhantomData<T> {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

// `Gc` is not `Copy`, so a `Copy` payload cannot hold a handle.
unsafe impl<T: Copy> Trace for Cell<T> {
    fn trace(&self, _tracer: &mut Tracer<'_>) {}
}

unsafe impl<T: Trace + ?Sized> Trace for RefCell<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.borrow().trace(tracer);
    }
}

unsafe impl<T: Trace + ?Sized> Trace for Box<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        (**self).trace(tracer);
    }
}

unsafe impl<T: Trace + ?Sized> Trace for Rc<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        (**self).trace(tracer);
    }
}

unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(value) = self {
            value.trace(tracer);
        }
    }
}

unsafe impl<T: Trace, E: Trace> Trace for Result<T, E> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            Ok(value) => value.trace(tracer),
            Err(err) => err.trace(tracer),
        }
    }
}

unsafe impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace, const N: usize> Trace for [T; N] {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.as_slice().trace(tracer);
    }
}

unsafe impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.as_slice().trace(tracer);
    }
}

unsafe impl<T: Trace> Trace for VecDeque<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace, S> Trace for HashSet<T, S> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<T: Trace> Trace for BTreeSet<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

unsafe impl<K: Trace, V: Trace, S> Trace for HashMap<K, V, S> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for (key, value) in self {
            key.trace(tracer);
            value.trace(tracer);
        }
    }
}

unsafe impl<K: Trace, V: Trace> Trace for BTreeMap<K, V> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for (key, value) in self {
            key.trace(tracer);
            value.trace(tracer);
        }
    }
}

macro_rules! tuple_trace {
    ($($name:ident),+) => {
        unsafe impl<$($name: Trace),+> Trace for ($($name,)+) {
            #[allow(non_snake_case)]
            fn trace(&self, tracer: &mut Tracer<'_>) {
                let ($($name,)+) = self;
                $($name.trace(tracer);)+
            }
        }
    };
}

tuple_trace!(A);
tuple_trace!(A, B);
tuple_trace!(A, B, C);
tuple_trace!(A, B, C, D);
tuple_trace!(A, B, C, D, E);
tuple_trace!(A, B, C, D, E, F);

/// Implements [`Trace`] for a non-generic struct by tracing the listed fields.
///
/// Listing a field that holds no handles is harmless; leaving out one that
/// does is the caller's bug, exactly as with a hand-written implementation.
///
/// ```
/// use cycle_gc::{Gc, trace_fields};
///
/// struct Pair {
///     label: String,
///     left: Gc<Pair>,
///     right: Gc<Pair>,
/// }
///
/// trace_fields!(Pair { left, right });
/// ```
#[macro_export]
macro_rules! trace_fields {
    ($ty:ty { $($field:tt),* $(,)? }) => {
        unsafe impl $crate::Trace for $ty {
            fn trace(&self, tracer: &mut $crate::Tracer<'_>) {
                $( $crate::Trace::trace(&self.$field, tracer); )*
            }
        }
    };
}
