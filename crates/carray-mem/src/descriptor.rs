//! Shared, refcounted layout metadata.
//!
//! A `Descriptor` is an `Rc` handle; the protocol count lives beside it. The
//! count decides when the format blob is released, while the `Rc` keeps the
//! record itself valid for whoever still points at it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use carray_core::alloc::checked_size;
use carray_core::refcount::RefCount;

use crate::error::{Error, Result};

struct DescriptorInner {
    element_size: usize,
    capacity_hint: usize,
    type_code: char,
    format: RefCell<Option<String>>,
    refcount: RefCount,
    released: Cell<bool>,
}

/// Element size, element count hint and format tag shared by arrays.
///
/// Not `Clone`: use [`Descriptor::share`] so the count stays equal to the
/// number of arrays holding it.
pub struct Descriptor(Rc<DescriptorInner>);

impl Descriptor {
    pub fn new(
        element_size: usize,
        capacity_hint: usize,
        type_code: char,
        format: impl Into<String>,
    ) -> Self {
        Self(Rc::new(DescriptorInner {
            element_size,
            capacity_hint,
            type_code,
            format: RefCell::new(Some(format.into())),
            refcount: RefCount::new(),
            released: Cell::new(false),
        }))
    }

    pub fn element_size(&self) -> usize {
        self.0.element_size
    }

    pub fn capacity_hint(&self) -> usize {
        self.0.capacity_hint
    }

    pub fn type_code(&self) -> char {
        self.0.type_code
    }

    /// Format tag, or `None` once released.
    pub fn format(&self) -> Option<String> {
        self.0.format.borrow().clone()
    }

    pub fn refcount(&self) -> i64 {
        self.0.refcount.get()
    }

    pub fn is_reclaimable(&self) -> bool {
        self.0.refcount.is_reclaimable()
    }

    pub fn is_released(&self) -> bool {
        self.0.released.get()
    }

    /// Bytes for `capacity_hint` elements.
    pub fn data_bytes(&self) -> Result<usize> {
        Ok(checked_size(self.0.capacity_hint, self.0.element_size)?)
    }

    pub fn incref(&self) {
        self.0.refcount.incref();
    }

    /// Take another reference for a new holder: `incref` plus a handle.
    pub fn share(&self) -> Descriptor {
        self.incref();
        Descriptor(Rc::clone(&self.0))
    }

    /// Observer that neither counts as a holder nor keeps the record alive.
    pub fn downgrade(&self) -> WeakDescriptor {
        WeakDescriptor(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Descriptor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Release the format blob if the count is below the reclaim threshold.
    ///
    /// Returns whether anything was released. Releasing twice is an
    /// invariant violation.
    pub fn release(&self) -> Result<bool> {
        if self.0.released.get() {
            return Err(Error::Invariant("descriptor released twice".into()));
        }
        if !self.is_reclaimable() {
            return Ok(false);
        }
        self.0.format.borrow_mut().take();
        self.0.released.set(true);
        Ok(true)
    }

    pub(crate) fn check_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(Error::Invariant(
                "array still references a released descriptor".into(),
            ));
        }
        if self.is_reclaimable() {
            return Err(Error::Invariant(format!(
                "descriptor refcount {} already below reclaim threshold",
                self.refcount()
            )));
        }
        Ok(())
    }
}

/// Non-owning view of a descriptor, for diagnostics.
#[derive(Debug, Clone)]
pub struct WeakDescriptor(Weak<DescriptorInner>);

impl WeakDescriptor {
    /// False once every holder dropped its reference.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn refcount(&self) -> Option<i64> {
        self.0.upgrade().map(|d| d.refcount.get())
    }

    pub fn is_released(&self) -> Option<bool> {
        self.0.upgrade().map(|d| d.released.get())
    }
}

/// Decrement `descriptor`; a no-op when absent.
pub fn decref(descriptor: Option<&Descriptor>) -> Result<()> {
    if let Some(d) = descriptor {
        d.0.refcount.decref()?;
    }
    Ok(())
}

/// Drop the holder's reference in `slot`: decrement, release if the count
/// crossed the threshold, and clear the slot either way.
///
/// Returns whether the descriptor was released.
pub fn decref_and_release(slot: &mut Option<Descriptor>) -> Result<bool> {
    decref(slot.as_ref())?;
    let released = match slot.as_ref() {
        Some(d) if d.is_reclaimable() => d.release()?,
        _ => false,
    };
    slot.take();
    Ok(released)
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("element_size", &self.0.element_size)
            .field("capacity_hint", &self.0.capacity_hint)
            .field("type_code", &self.0.type_code)
            .field("refcount", &self.0.refcount.get())
            .field("released", &self.0.released.get())
            .finish()
    }
}
