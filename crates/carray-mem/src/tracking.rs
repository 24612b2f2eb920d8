//! Live/peak byte accounting for the allocator.
//!
//! Keep this cheap; it runs on every alloc and free.

use std::cell::Cell;

use carray_core::alloc::AllocatorStats;

#[derive(Debug, Default)]
pub struct AllocTracker {
    live_bytes: Cell<usize>,
    peak_bytes: Cell<usize>,
    allocations: Cell<u64>,
    frees: Cell<u64>,
}

impl AllocTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful allocation; updates peak if higher.
    pub fn record_alloc(&self, bytes: usize) {
        let live = self.live_bytes.get() + bytes;
        self.live_bytes.set(live);
        self.allocations.set(self.allocations.get() + 1);
        if live > self.peak_bytes.get() {
            self.peak_bytes.set(live);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(bytes, live, peak = self.peak_bytes.get(), "carray alloc");
    }

    pub fn record_free(&self, bytes: usize) {
        // Saturating: a foreign buffer must not wrap the counter.
        let live = self.live_bytes.get().saturating_sub(bytes);
        self.live_bytes.set(live);
        self.frees.set(self.frees.get() + 1);
        #[cfg(feature = "tracing")]
        tracing::trace!(bytes, live, "carray free");
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.get()
    }

    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            live_bytes: self.live_bytes.get(),
            peak_bytes: self.peak_bytes.get(),
            allocations: self.allocations.get(),
            frees: self.frees.get(),
        }
    }
}
