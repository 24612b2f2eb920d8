//! Buffer registry: stable handles to live array records.
//!
//! The registry is the arena the cascades consult; removing a record from it
//! is the single point where that record is destroyed. It takes no part in
//! refcount accounting.

use std::collections::HashMap;

use carray_core::id::ArrayHandle;

use crate::array::CArray;

/// Lookup/removal interface the free cascades depend on.
pub trait BufferRegistry {
    /// Store `array` under a fresh handle. Handles are never reused.
    fn insert(&mut self, array: CArray) -> ArrayHandle;

    fn lookup(&self, handle: ArrayHandle) -> Option<&CArray>;

    fn lookup_mut(&mut self, handle: ArrayHandle) -> Option<&mut CArray>;

    /// Remove and return the record; `None` if the handle is unknown.
    fn remove(&mut self, handle: ArrayHandle) -> Option<CArray>;

    fn len(&self) -> usize;

    fn contains(&self, handle: ArrayHandle) -> bool {
        self.lookup(handle).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// HashMap-backed registry with monotonically increasing handles.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<ArrayHandle, CArray>,
    next_id: u64,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles currently registered, sorted.
    pub fn handles(&self) -> Vec<ArrayHandle> {
        let mut out: Vec<ArrayHandle> = self.slots.keys().copied().collect();
        out.sort();
        out
    }
}

impl BufferRegistry for SlotRegistry {
    fn insert(&mut self, array: CArray) -> ArrayHandle {
        let handle = ArrayHandle::new(self.next_id);
        self.next_id += 1;
        self.slots.insert(handle, array);
        handle
    }

    fn lookup(&self, handle: ArrayHandle) -> Option<&CArray> {
        self.slots.get(&handle)
    }

    fn lookup_mut(&mut self, handle: ArrayHandle) -> Option<&mut CArray> {
        self.slots.get_mut(&handle)
    }

    fn remove(&mut self, handle: ArrayHandle) -> Option<CArray> {
        self.slots.remove(&handle)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}
