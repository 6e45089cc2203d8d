//! Tracing mark-and-sweep garbage collection for cyclic object graphs
//!
//! Values are allocated on a [`Heap`] and referenced through [`Gc`] handles.
//! Handles never free anything themselves: a collection marks everything
//! reachable from the root handles and destroys the rest, cycles included.
//! Types declare their handle fields by implementing [`Trace`].

pub mod collector;
pub mod config;
pub mod error;
pub mod gc;
pub mod handle;
pub mod release;
pub mod trace;

mod node;
mod registry;
mod roots;

/// Snapshot of a heap's counters, as returned by [`Heap::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Allocations currently tracked.
    pub tracked: usize,
    /// Handles currently in the root set.
    pub roots: usize,
    pub collections: usize,
    /// Allocations destroyed by collections so far.
    pub destroyed: usize,
    pub last_collection: CollectStats,
}

pub use collector::CollectStats;
pub use config::{DEBUG_COLLECTABLE, DEBUG_STATS, HeapConfig};
pub use error::GcError;
pub use gc::{Heap, global};
pub use handle::Gc;
pub use release::{BoxRelease, Exclusive, Release, Unique};
pub use trace::{Trace, Tracer};

pub type GcResult<T> = Result<T, GcError>;
