//! Data buffers and borrowed regions.

use std::ops::{Deref, DerefMut};

use carray_core::id::ArrayHandle;
use serde::{Deserialize, Serialize};

/// Exclusively owned data buffer handed out by an allocator.
///
/// Only owner arrays hold one; it goes back through `Allocator::free` so the
/// accounting sees every release.
#[derive(Debug, PartialEq, Eq)]
pub struct DataBuffer {
    buf: Vec<u8>,
}

impl DataBuffer {
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Expose the inner Vec, bypassing allocator accounting.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Deref for DataBuffer {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for DataBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

/// Byte range a view borrows from its base's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedRegion {
    pub base: ArrayHandle,
    pub offset: usize,
    pub len: usize,
}

impl BorrowedRegion {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}
