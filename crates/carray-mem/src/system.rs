//! System allocator: thin pass-through to the global allocator with a byte
//! cap and accounting.

use carray_core::alloc::{checked_size, Allocator, AllocatorStats};
use carray_core::config::GcConfig;
use carray_core::error::{Error, Result};

use crate::buffer::DataBuffer;
use crate::tracking::AllocTracker;

#[derive(Debug, Default)]
pub struct SystemAllocator {
    cap_bytes: Option<usize>,
    tracker: AllocTracker,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that refuses to hold more than `cap_bytes` live bytes.
    pub fn with_cap(cap_bytes: usize) -> Self {
        Self {
            cap_bytes: Some(cap_bytes),
            tracker: AllocTracker::new(),
        }
    }

    pub fn from_config(cfg: &GcConfig) -> Self {
        Self {
            cap_bytes: cfg.mem_cap_bytes,
            tracker: AllocTracker::new(),
        }
    }

    pub fn cap_bytes(&self) -> Option<usize> {
        self.cap_bytes
    }

    pub fn live_bytes(&self) -> usize {
        self.tracker.live_bytes()
    }

    fn reserve(&self, bytes: usize) -> Result<Vec<u8>> {
        if let Some(cap) = self.cap_bytes {
            let used = self.tracker.live_bytes();
            if used.saturating_add(bytes) > cap {
                return Err(Error::AllocFailed {
                    bytes,
                    reason: format!("cap {} bytes, {} in use", cap, used),
                });
            }
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes).map_err(|e| Error::AllocFailed {
            bytes,
            reason: e.to_string(),
        })?;
        Ok(buf)
    }
}

impl Allocator for SystemAllocator {
    type Buffer = DataBuffer;

    fn alloc(&self, bytes: usize) -> Result<DataBuffer> {
        let mut buf = self.reserve(bytes)?;
        // Contents are unspecified to callers; safe code still has to fill them.
        buf.resize(bytes, 0u8);
        self.tracker.record_alloc(bytes);
        Ok(DataBuffer::from_vec(buf))
    }

    fn zeroed_alloc(&self, count: usize, size: usize) -> Result<DataBuffer> {
        let bytes = checked_size(count, size)?;
        let mut buf = self.reserve(bytes)?;
        buf.resize(bytes, 0u8);
        self.tracker.record_alloc(bytes);
        Ok(DataBuffer::from_vec(buf))
    }

    fn free(&self, buffer: DataBuffer) {
        self.tracker.record_free(buffer.len());
        drop(buffer);
    }

    fn stats(&self) -> AllocatorStats {
        self.tracker.snapshot()
    }
}
