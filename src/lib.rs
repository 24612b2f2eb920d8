#![forbid(unsafe_code)]
//! carray: memory ownership for N-dimensional arrays embedded in a host
//! runtime.
//!
//! Re-exports the member crates. See `carray_mem::cascade` for the release
//! protocol.

pub use carray_core;
pub use carray_mem;

pub use carray_core::alloc::{Allocator, AllocatorStats};
pub use carray_core::config::GcConfig;
pub use carray_core::flags::ArrayFlags;
pub use carray_core::id::ArrayHandle;
pub use carray_core::refcount::{RefCount, RECLAIM_THRESHOLD};
pub use carray_mem::error::{Error, Result};
pub use carray_mem::{
    free_from_registry, ArrayConstructor, ArrayData, ArrayStore, BorrowedRegion, BufferRegistry,
    CArray, CascadeKind, DataBuffer, Descriptor, FreeReport, GcTrace, SlotRegistry,
    StridedConstructor, SystemAllocator, TraceEvent, WeakDescriptor,
};
