#![forbid(unsafe_code)]
//! carray-core: shared vocabulary for the CArray memory-ownership subsystem.
//!
//! Handles, configuration, the refcount primitive, array flags and the
//! allocator interface live here. The concrete allocator, registry and the
//! free cascades live in `carray-mem`.

pub mod alloc;
pub mod config;
pub mod error;
pub mod flags;
pub mod id;
pub mod refcount;
