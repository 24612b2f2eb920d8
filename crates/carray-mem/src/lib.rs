#![forbid(unsafe_code)]
//! carray-mem: buffer allocation and the refcount/free protocol for CArray.
//!
//! Arrays either own their data buffer or are views borrowing a region of a
//! base array's buffer. Descriptors are shared between arrays. The free
//! cascades in [`cascade`] decide, for each release, whether a descriptor, a
//! buffer and/or a registry slot may be reclaimed, and guarantee a shared
//! buffer is released exactly once.
//!
//! Everything here is single-threaded: counts are `Cell`s and descriptors are
//! `Rc`-shared, so none of these types are `Send`.

pub mod allocation;
pub mod array;
pub mod buffer;
pub mod cascade;
pub mod constructor;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod store;
pub mod system;
pub mod trace;
pub mod tracking;

pub use array::{ArrayData, CArray};
pub use buffer::{BorrowedRegion, DataBuffer};
pub use cascade::{free_from_registry, CascadeKind, FreeReport};
pub use constructor::{ArrayConstructor, StridedConstructor};
pub use descriptor::{Descriptor, WeakDescriptor};
pub use registry::{BufferRegistry, SlotRegistry};
pub use store::ArrayStore;
pub use system::SystemAllocator;
pub use trace::{GcTrace, TraceEvent};
