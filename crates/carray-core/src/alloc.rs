//! Abstract allocator interface.
//!
//! The concrete implementation lives in `carray-mem`. We keep only the trait
//! here so any crate can depend on the API without pulling the allocator.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Snapshot of allocator accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocations: u64,
    pub frees: u64,
}

/// Thin allocator wrapper used for every data buffer.
///
/// Failure is always reported as [`Error::AllocFailed`]; implementations must
/// never return a buffer shorter than requested.
pub trait Allocator {
    type Buffer;

    /// Allocate `bytes` bytes. Contents are unspecified.
    fn alloc(&self, bytes: usize) -> Result<Self::Buffer>;

    /// Allocate `count * size` bytes, all zero.
    fn zeroed_alloc(&self, count: usize, size: usize) -> Result<Self::Buffer>;

    /// Return a buffer obtained from this allocator.
    fn free(&self, buffer: Self::Buffer);

    fn stats(&self) -> AllocatorStats;
}

/// `count * size`, or `AllocFailed` on overflow.
pub fn checked_size(count: usize, size: usize) -> Result<usize> {
    count.checked_mul(size).ok_or_else(|| Error::AllocFailed {
        bytes: usize::MAX,
        reason: format!("size overflow computing {} * {}", count, size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_size_multiplies() {
        assert_eq!(checked_size(10, 4).unwrap(), 40);
        assert_eq!(checked_size(0, 8).unwrap(), 0);
    }

    #[test]
    fn checked_size_reports_overflow() {
        let err = checked_size(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, Error::AllocFailed { .. }));
    }
}
