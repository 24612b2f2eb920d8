//! `ArrayStore`: allocator, registry, constructor and trace mode bundled as
//! the context every operation runs in.

use std::ops::Range;

use carray_core::alloc::Allocator;
use carray_core::config::GcConfig;
use carray_core::flags::ArrayFlags;
use carray_core::id::ArrayHandle;
use carray_core::refcount::RECLAIM_THRESHOLD;

use crate::allocation::array_alloc;
use crate::array::{ArrayData, CArray};
use crate::buffer::{BorrowedRegion, DataBuffer};
use crate::cascade::{free_from_registry, reclaim_detached, FreeReport};
use crate::constructor::{
    byte_span, contiguous_strides, ArrayConstructor, ArrayRequest, StridedConstructor,
};
use crate::descriptor::{self, Descriptor};
use crate::error::{Error, Result};
use crate::registry::{BufferRegistry, SlotRegistry};
use crate::system::SystemAllocator;
use crate::trace::GcTrace;

pub struct ArrayStore<A = SystemAllocator, R = SlotRegistry, C = StridedConstructor> {
    alloc: A,
    registry: R,
    constructor: C,
    trace: GcTrace,
}

impl ArrayStore {
    /// Store with default configuration and no tracing.
    pub fn new() -> Self {
        Self::with_parts(
            SystemAllocator::new(),
            SlotRegistry::new(),
            StridedConstructor,
            GcTrace::Off,
        )
    }

    pub fn from_config(cfg: &GcConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::with_parts(
            SystemAllocator::from_config(cfg),
            SlotRegistry::new(),
            StridedConstructor,
            GcTrace::from_config(cfg),
        ))
    }

    /// Resolve `CARRAY_GC_DEBUG` and `CARRAY_MEM_CAP_BYTES` once.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&GcConfig::from_env())
    }
}

impl Default for ArrayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R, C> ArrayStore<A, R, C>
where
    A: Allocator<Buffer = DataBuffer>,
    R: BufferRegistry,
    C: ArrayConstructor,
{
    pub fn with_parts(alloc: A, registry: R, constructor: C, trace: GcTrace) -> Self {
        Self {
            alloc,
            registry,
            constructor,
            trace,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn trace(&self) -> &GcTrace {
        &self.trace
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, handle: ArrayHandle) -> bool {
        self.registry.contains(handle)
    }

    pub fn register(&mut self, array: CArray) -> ArrayHandle {
        self.registry.insert(array)
    }

    pub fn get(&self, handle: ArrayHandle) -> Result<&CArray> {
        self.registry
            .lookup(handle)
            .ok_or(Error::StaleHandle(handle))
    }

    /// Allocate an owning array for `descriptor` and register it.
    pub fn create(
        &mut self,
        descriptor: Descriptor,
        dims: &[usize],
        is_fortran: bool,
    ) -> Result<ArrayHandle> {
        let array = array_alloc(
            &self.constructor,
            &self.alloc,
            descriptor,
            dims.len(),
            dims,
            is_fortran,
            None,
        )?;
        Ok(self.register(array))
    }

    /// Register a view borrowing from `base`, starting `offset` bytes into
    /// the base's reachable bytes.
    ///
    /// The view shares the base's descriptor and raises the base's count by
    /// one; releasing the view gives both back.
    pub fn view(
        &mut self,
        base: ArrayHandle,
        dims: &[usize],
        strides: Option<&[isize]>,
        offset: usize,
    ) -> Result<ArrayHandle> {
        let base_array = self.get(base)?;
        if base_array.is_detached() {
            return Err(Error::Invariant(format!(
                "{} was already released by its holder",
                base
            )));
        }
        let base_descr = base_array.descriptor().ok_or_else(|| {
            Error::Invariant(format!("{} has no descriptor to share", base))
        })?;
        let elsize = base_descr.element_size();
        let flags = if base_array.flags().contains(ArrayFlags::WRITEABLE) {
            ArrayFlags::WRITEABLE
        } else {
            ArrayFlags::NONE
        };

        let strides = match strides {
            Some(s) => s.to_vec(),
            None => contiguous_strides(dims, elsize, false)?,
        };
        let (low, high) = byte_span(dims, &strides, elsize)?;
        let available = self.resolve(base)?.1.len();
        let overflow = || Error::Invariant("view offset overflow".into());
        let offset = isize::try_from(offset).map_err(|_| overflow())?;
        let start = offset.checked_add(low).ok_or_else(overflow)?;
        let end = offset.checked_add(high).ok_or_else(overflow)?;
        if start < 0 || end as usize > available {
            return Err(Error::Invariant(format!(
                "view bytes {}..{} fall outside {} bytes of {}",
                start, end, available, base
            )));
        }
        let region = BorrowedRegion {
            base,
            offset: start as usize,
            len: (end - start) as usize,
        };

        let shared = base_descr.share();
        let request = ArrayRequest {
            dims,
            strides: Some(strides.as_slice()),
            data: Some(ArrayData::View(region)),
            flags,
            interface_data: None,
        };
        let built = self
            .constructor
            .new_from_descriptor(&self.alloc, CArray::bare(), shared, request);
        let base_array = self.get(base)?;
        let view = match built {
            Ok(v) => v,
            Err(e) => {
                descriptor::decref(base_array.descriptor())?;
                return Err(e);
            }
        };
        base_array.add_view();
        Ok(self.register(view))
    }

    /// Owning array and byte range that `handle`'s data lives in.
    pub fn resolve(&self, handle: ArrayHandle) -> Result<(ArrayHandle, Range<usize>)> {
        let mut cur = handle;
        let mut start = 0usize;
        let mut len: Option<usize> = None;
        loop {
            let array = self.registry.lookup(cur).ok_or_else(|| {
                if cur == handle {
                    Error::StaleHandle(handle)
                } else {
                    Error::Invariant(format!("{} borrows from missing {}", handle, cur))
                }
            })?;
            match array.data() {
                ArrayData::Owned(Some(buf)) => {
                    let len = len.unwrap_or(buf.len());
                    if start + len > buf.len() {
                        return Err(Error::Invariant(format!(
                            "{} reaches past the end of {}",
                            handle, cur
                        )));
                    }
                    return Ok((cur, start..start + len));
                }
                ArrayData::Owned(None) => {
                    return Err(Error::Invariant(format!("{} has no live data", cur)));
                }
                ArrayData::View(region) => {
                    start += region.offset;
                    len.get_or_insert(region.len);
                    cur = region.base;
                }
            }
        }
    }

    /// Bytes reachable through `handle`, following views to their owner.
    pub fn bytes(&self, handle: ArrayHandle) -> Result<&[u8]> {
        let (owner, range) = self.resolve(handle)?;
        let array = self.get(owner)?;
        array
            .owned_bytes()
            .and_then(|b| b.get(range))
            .ok_or_else(|| Error::Invariant(format!("{} has no live data", owner)))
    }

    pub fn bytes_mut(&mut self, handle: ArrayHandle) -> Result<&mut [u8]> {
        let (owner, range) = self.resolve(handle)?;
        self.registry
            .lookup_mut(owner)
            .and_then(CArray::owned_bytes_mut)
            .and_then(|b| b.get_mut(range))
            .ok_or_else(|| Error::Invariant(format!("{} has no live data", owner)))
    }

    pub fn incref(&self, handle: ArrayHandle) -> Result<()> {
        self.get(handle)?.incref();
        Ok(())
    }

    /// Bookkeeping decrement; never reclaims.
    pub fn xdecref(&self, handle: ArrayHandle) -> Result<()> {
        self.get(handle)?.xdecref()
    }

    /// Drop one reference to a registered array.
    ///
    /// Only holders other than views count here; views give their share back
    /// through their own cascade. While other holders remain this is
    /// bookkeeping. The last one letting go runs the free cascade. For a
    /// record the cascade had to leave in place, crossing the threshold
    /// finishes the reclaim.
    pub fn decref(&mut self, handle: ArrayHandle) -> Result<Option<FreeReport>> {
        let array = self.get(handle)?;
        let held = array.held_count();
        if array.is_detached() {
            if held < RECLAIM_THRESHOLD {
                return Err(Error::Invariant(format!(
                    "{} has no holder left besides {} views",
                    handle,
                    array.view_count()
                )));
            }
            array.xdecref()?;
            if !array.is_reclaimable() {
                return Ok(None);
            }
            return reclaim_detached(&mut self.registry, &self.alloc, &self.trace, handle)
                .map(Some);
        }
        if held > RECLAIM_THRESHOLD {
            array.xdecref()?;
            return Ok(None);
        }
        self.free(handle).map(Some)
    }

    /// Free dispatcher: run the owner or view cascade for `handle`.
    pub fn free(&mut self, handle: ArrayHandle) -> Result<FreeReport> {
        free_from_registry(&mut self.registry, &self.alloc, &self.trace, handle)
    }
}
