//! Array records: dimension/stride metadata, a descriptor reference, and data
//! that is either owned or borrowed from a base array.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use carray_core::alloc::Allocator;
use carray_core::flags::ArrayFlags;
use carray_core::id::ArrayHandle;
use carray_core::refcount::RefCount;

use crate::buffer::{BorrowedRegion, DataBuffer};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// Owned XOR borrowed data. Only the `Owned` arm can ever release a buffer.
#[derive(Debug)]
pub enum ArrayData {
    /// `None` before allocation and after release.
    Owned(Option<DataBuffer>),
    View(BorrowedRegion),
}

#[derive(Debug)]
pub struct CArray {
    pub(crate) dimensions: Option<Vec<usize>>,
    pub(crate) strides: Option<Vec<isize>>,
    pub(crate) data: ArrayData,
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) refcount: RefCount,
    pub(crate) flags: ArrayFlags,
    /// Opaque host payload handed to the constructor.
    pub(crate) interface: Option<Rc<dyn Any>>,
    // Share of `refcount` held by registered views borrowing from this array.
    pub(crate) views: Cell<usize>,
    // Set once the free cascade ran but the record had to persist.
    pub(crate) detached: bool,
}

impl CArray {
    /// Unpopulated record, to be filled in by an `ArrayConstructor`.
    pub fn bare() -> Self {
        Self {
            dimensions: None,
            strides: None,
            data: ArrayData::Owned(None),
            descriptor: None,
            refcount: RefCount::new(),
            flags: ArrayFlags::NONE,
            interface: None,
            views: Cell::new(0),
            detached: false,
        }
    }

    pub(crate) fn is_bare(&self) -> bool {
        self.dimensions.is_none()
            && self.descriptor.is_none()
            && matches!(self.data, ArrayData::Owned(None))
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.as_ref().map_or(0, Vec::len)
    }

    /// `None` once the metadata has been released.
    pub fn dimensions(&self) -> Option<&[usize]> {
        self.dimensions.as_deref()
    }

    pub fn strides(&self) -> Option<&[isize]> {
        self.strides.as_deref()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Owned buffer, if this array owns one that is still live.
    pub fn owned_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::Owned(Some(buf)) => Some(buf),
            _ => None,
        }
    }

    pub fn owned_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.data {
            ArrayData::Owned(Some(buf)) => Some(buf),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn flags(&self) -> ArrayFlags {
        self.flags
    }

    pub fn interface_data(&self) -> Option<&Rc<dyn Any>> {
        self.interface.as_ref()
    }

    pub fn owns_data(&self) -> bool {
        matches!(self.data, ArrayData::Owned(_))
    }

    /// Handle of the array this view borrows from.
    pub fn base(&self) -> Option<ArrayHandle> {
        match &self.data {
            ArrayData::View(region) => Some(region.base),
            ArrayData::Owned(_) => None,
        }
    }

    pub fn refcount(&self) -> i64 {
        self.refcount.get()
    }

    /// Number of live views whose release still owes this array a decrement.
    pub fn view_count(&self) -> usize {
        self.views.get()
    }

    /// Count held by everything except views, which release through their
    /// own cascade.
    pub fn held_count(&self) -> i64 {
        let views = i64::try_from(self.views.get()).unwrap_or(i64::MAX);
        self.refcount.get().saturating_sub(views)
    }

    pub fn is_reclaimable(&self) -> bool {
        self.refcount.is_reclaimable()
    }

    /// True once the free cascade ran and left the record in place.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn metadata_released(&self) -> bool {
        self.dimensions.is_none() && self.strides.is_none()
    }

    pub fn incref(&self) {
        self.refcount.incref();
    }

    /// Bookkeeping decrement; never reclaims anything.
    pub fn xdecref(&self) -> Result<()> {
        Ok(self.refcount.decref()?)
    }

    pub(crate) fn add_view(&self) {
        self.views.set(self.views.get() + 1);
        self.refcount.incref();
    }

    // Records built by hand may borrow without having been counted.
    pub(crate) fn drop_view(&self) -> Result<()> {
        self.refcount.decref()?;
        self.views.set(self.views.get().saturating_sub(1));
        Ok(())
    }

    /// Decrement and run the standalone free, for arrays that were never
    /// registered.
    ///
    /// The record is always consumed. When the count stays at or above the
    /// threshold another holder still needs the data, so the owned buffer is
    /// handed back instead of released.
    pub fn decref<A>(self, alloc: &A) -> Result<Option<DataBuffer>>
    where
        A: Allocator<Buffer = DataBuffer>,
    {
        self.xdecref()?;
        Ok(self.free_standalone(alloc))
    }

    fn free_standalone<A>(mut self, alloc: &A) -> Option<DataBuffer>
    where
        A: Allocator<Buffer = DataBuffer>,
    {
        self.release_metadata();
        let data = self.take_owned_data();
        if self.is_reclaimable() {
            if let Some(buf) = data {
                alloc.free(buf);
            }
            None
        } else {
            data
        }
    }

    /// Drop dimensions and strides. Returns whether anything was held.
    pub(crate) fn release_metadata(&mut self) -> bool {
        let had = self.dimensions.is_some() || self.strides.is_some();
        self.dimensions = None;
        self.strides = None;
        had
    }

    /// Detach the owned buffer; views have none to give.
    pub(crate) fn take_owned_data(&mut self) -> Option<DataBuffer> {
        match &mut self.data {
            ArrayData::Owned(slot) => slot.take(),
            ArrayData::View(_) => None,
        }
    }

    pub(crate) fn set_owned_data(&mut self, buf: DataBuffer) -> Result<()> {
        match &mut self.data {
            ArrayData::Owned(slot @ None) => {
                *slot = Some(buf);
                self.flags.insert(ArrayFlags::OWNDATA);
                Ok(())
            }
            ArrayData::Owned(Some(_)) => {
                Err(Error::Invariant("array already holds a data buffer".into()))
            }
            ArrayData::View(_) => Err(Error::Invariant(
                "cannot attach an owned buffer to a view".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemAllocator;

    fn owner(alloc: &SystemAllocator, bytes: usize) -> CArray {
        let mut a = CArray::bare();
        a.dimensions = Some(vec![bytes]);
        a.strides = Some(vec![1]);
        a.set_owned_data(alloc.alloc(bytes).unwrap()).unwrap();
        a
    }

    #[test]
    fn xdecref_only_counts() {
        let alloc = SystemAllocator::new();
        let a = owner(&alloc, 8);
        a.incref();
        a.xdecref().unwrap();
        a.xdecref().unwrap();
        assert_eq!(a.refcount(), -1);
        assert!(a.owned_bytes().is_some());
        assert!(!a.metadata_released());
    }

    #[test]
    fn standalone_decref_below_threshold_frees_data() {
        let alloc = SystemAllocator::new();
        let a = owner(&alloc, 16);
        assert!(a.decref(&alloc).unwrap().is_none());
        assert_eq!(alloc.live_bytes(), 0);
        assert_eq!(alloc.stats().frees, 1);
    }

    #[test]
    fn standalone_decref_with_holders_keeps_data() {
        let alloc = SystemAllocator::new();
        let a = owner(&alloc, 16);
        a.incref();
        let kept = a.decref(&alloc).unwrap().expect("data survives");
        assert_eq!(kept.len(), 16);
        assert_eq!(alloc.live_bytes(), 16);
        assert_eq!(alloc.stats().frees, 0);
    }

    #[test]
    fn second_buffer_is_rejected() {
        let alloc = SystemAllocator::new();
        let mut a = owner(&alloc, 4);
        let extra = alloc.alloc(4).unwrap();
        assert!(matches!(a.set_owned_data(extra), Err(Error::Invariant(_))));
    }

    #[test]
    fn view_reports_its_base() {
        let mut v = CArray::bare();
        v.data = ArrayData::View(BorrowedRegion {
            base: ArrayHandle::new(3),
            offset: 0,
            len: 4,
        });
        assert!(!v.owns_data());
        assert_eq!(v.base(), Some(ArrayHandle::new(3)));
        assert!(v.take_owned_data().is_none());
    }
}
