/// Log a summary of every collection at info level.
pub const DEBUG_STATS: u32 = 1 << 0;
/// Log every allocation the collector destroys.
pub const DEBUG_COLLECTABLE: u32 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bitwise OR of the `DEBUG_*` flags.
    pub debug: u32,
    /// Capacity reserved up front for the registry and the root set.
    pub initial_capacity: usize,
    /// Destroy every remaining allocation when the heap is dropped. When
    /// false, whatever is still tracked at that point is leaked.
    pub teardown_on_drop: bool,
    pub enabled: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            debug: 0,
            initial_capacity: 64,
            teardown_on_drop: true,
            enabled: true,
        }
    }
}

impl HeapConfig {
    pub fn with_debug(mut self, flags: u32) -> Self {
        self.debug = flags;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_teardown_on_drop(mut self, teardown: bool) -> Self {
        self.teardown_on_drop = teardown;
        self
    }
}
