//! The refcount primitive shared by descriptors and arrays.
//!
//! Counts follow the host convention: a fresh object starts at `0`, which
//! stands for its single implicit holder. A count strictly below
//! [`RECLAIM_THRESHOLD`] is reclaimable, and the same predicate is used by every
//! release path. Decrementing a count that is already reclaimable is an
//! invariant violation.

use std::cell::Cell;

use crate::error::{Error, Result};

pub const RECLAIM_THRESHOLD: i64 = 0;

/// Non-atomic refcount. `!Sync` on purpose: the subsystem is single-threaded.
#[derive(Debug, Default)]
pub struct RefCount(Cell<i64>);

impl RefCount {
    pub fn new() -> Self {
        Self(Cell::new(0))
    }

    pub fn with_count(count: i64) -> Self {
        Self(Cell::new(count))
    }

    pub fn get(&self) -> i64 {
        self.0.get()
    }

    pub fn incref(&self) {
        self.0.set(self.0.get() + 1);
    }

    /// Lower the count by one without any reclaim side effect.
    pub fn decref(&self) -> Result<()> {
        let cur = self.0.get();
        if cur < RECLAIM_THRESHOLD {
            return Err(Error::Invariant(format!(
                "decrement of already reclaimable refcount {}",
                cur
            )));
        }
        self.0.set(cur - 1);
        Ok(())
    }

    pub fn is_reclaimable(&self) -> bool {
        self.0.get() < RECLAIM_THRESHOLD
    }
}
