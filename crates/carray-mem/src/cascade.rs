//! Registry-aware free protocol.
//!
//! [`free_from_registry`] resolves a handle and runs exactly one of two
//! cascades. An owner and its views must never both release the same buffer,
//! yet the buffer has to be released exactly once, when neither the owner nor
//! any view still needs it.
//!
//! Owner-cascade (array owns its buffer):
//! 1. drop the descriptor reference, releasing the descriptor past threshold
//! 2. `xdecref` the array
//! 3. release dimensions and strides
//! 4. if the array is reclaimable, free its data and remove its slot;
//!    otherwise the record stays registered with its data intact
//!
//! View-cascade (array borrows from `base`):
//! 1. `xdecref` the view
//! 2. `xdecref` the base
//! 3. drop the descriptor reference as above
//! 4. release dimensions and strides
//! 5. if view and base are both reclaimable, free the base's data (when the
//!    base owns it) and remove the base's slot
//! 6. independently, if the view is reclaimable, remove its own slot
//!
//! Every precondition is checked before the first mutation, so an invariant
//! violation leaves counts, buffers and slots untouched.

use carray_core::alloc::Allocator;
use carray_core::id::ArrayHandle;
use serde::Serialize;

use crate::array::CArray;
use crate::buffer::DataBuffer;
use crate::descriptor::decref_and_release;
use crate::error::{Error, Result};
use crate::registry::BufferRegistry;
use crate::trace::{GcTrace, TraceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CascadeKind {
    Owner,
    View,
    /// Finishing a record the cascade had to leave in place.
    Deferred,
}

/// What a single release reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeReport {
    pub handle: ArrayHandle,
    pub kind: CascadeKind,
    pub descriptor_released: bool,
    pub metadata_released: bool,
    /// Array whose data buffer was freed, if any.
    pub data_freed: Option<ArrayHandle>,
    /// Registry slots removed, in removal order.
    pub removed: Vec<ArrayHandle>,
}

impl FreeReport {
    fn new(handle: ArrayHandle, kind: CascadeKind) -> Self {
        Self {
            handle,
            kind,
            descriptor_released: false,
            metadata_released: false,
            data_freed: None,
            removed: Vec::new(),
        }
    }
}

/// Run the release cascade for `handle`.
///
/// Fails with `StaleHandle` for unknown handles and with `Invariant` if the
/// cascade already ran for this handle or a view's base cannot be resolved.
pub fn free_from_registry<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    handle: ArrayHandle,
) -> Result<FreeReport>
where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    let array = registry
        .lookup(handle)
        .ok_or(Error::StaleHandle(handle))?;
    if array.is_detached() {
        return Err(Error::Invariant(format!(
            "free cascade already ran for {}",
            handle
        )));
    }
    check_releasable(array, handle)?;

    match array.base() {
        None => free_owner(registry, alloc, trace, handle),
        Some(base) => free_view(registry, alloc, trace, handle, base),
    }
}

fn check_releasable(array: &CArray, handle: ArrayHandle) -> Result<()> {
    if array.is_reclaimable() {
        return Err(Error::Invariant(format!(
            "{} refcount {} already below reclaim threshold",
            handle,
            array.refcount()
        )));
    }
    if let Some(d) = array.descriptor() {
        d.check_live()?;
    }
    Ok(())
}

fn free_owner<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    handle: ArrayHandle,
) -> Result<FreeReport>
where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    let mut report = FreeReport::new(handle, CascadeKind::Owner);
    let array = registry
        .lookup_mut(handle)
        .ok_or(Error::StaleHandle(handle))?;

    if decref_and_release(&mut array.descriptor)? {
        trace.emit(TraceEvent::DescriptorFreed {
            handle,
            view: false,
        });
        report.descriptor_released = true;
    }

    array.xdecref()?;

    trace.emit(TraceEvent::MetadataFreed {
        handle,
        view: false,
    });
    report.metadata_released = array.release_metadata();

    if array.is_reclaimable() {
        reclaim_owner(registry, alloc, trace, handle, &mut report);
    } else {
        array.detached = true;
    }
    Ok(report)
}

fn free_view<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    handle: ArrayHandle,
    base: ArrayHandle,
) -> Result<FreeReport>
where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    let base_array = registry.lookup(base).ok_or_else(|| {
        Error::Invariant(format!("view {} has no live base {}", handle, base))
    })?;
    if base_array.is_reclaimable() {
        return Err(Error::Invariant(format!(
            "base {} of view {} already below reclaim threshold",
            base, handle
        )));
    }
    if !base_array.is_detached() {
        if let Some(d) = base_array.descriptor() {
            d.check_live()?;
        }
    }

    let mut report = FreeReport::new(handle, CascadeKind::View);

    let view = registry
        .lookup_mut(handle)
        .ok_or(Error::StaleHandle(handle))?;
    view.xdecref()?;
    let view_reclaimable = view.is_reclaimable();

    if let Some(b) = registry.lookup(base) {
        b.drop_view()?;
    }

    let view = registry
        .lookup_mut(handle)
        .ok_or(Error::StaleHandle(handle))?;
    if decref_and_release(&mut view.descriptor)? {
        trace.emit(TraceEvent::DescriptorFreed { handle, view: true });
        report.descriptor_released = true;
    }
    trace.emit(TraceEvent::MetadataFreed { handle, view: true });
    report.metadata_released = view.release_metadata();

    if view_reclaimable {
        reclaim_base(registry, alloc, trace, base, handle, &mut report)?;
        remove_slot(registry, trace, handle, handle, true, &mut report);
    } else {
        view.detached = true;
    }
    Ok(report)
}

/// Finish a record the cascade left registered because it still had
/// holders. Runs once its count drops below the threshold.
pub(crate) fn reclaim_detached<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    handle: ArrayHandle,
) -> Result<FreeReport>
where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    let mut report = FreeReport::new(handle, CascadeKind::Deferred);
    let array = registry
        .lookup(handle)
        .ok_or(Error::StaleHandle(handle))?;
    match array.base() {
        None => reclaim_owner(registry, alloc, trace, handle, &mut report),
        Some(base) => {
            reclaim_base(registry, alloc, trace, base, handle, &mut report)?;
            remove_slot(registry, trace, handle, handle, true, &mut report);
        }
    }
    Ok(report)
}

// Step 5 of the view cascade: the departing view was the last thing keeping
// `base` alive. Trace lines carry the view's handle.
fn reclaim_base<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    base: ArrayHandle,
    view: ArrayHandle,
    report: &mut FreeReport,
) -> Result<()>
where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    let b = match registry.lookup_mut(base) {
        Some(b) if b.is_reclaimable() => b,
        _ => return Ok(()),
    };
    // Holders let go through bookkeeping only, so the base's own cascade
    // never dropped its descriptor reference.
    if !b.is_detached() {
        if decref_and_release(&mut b.descriptor)? {
            trace.emit(TraceEvent::DescriptorFreed { handle: view, view: true });
            report.descriptor_released = true;
        }
        b.release_metadata();
    }
    if let Some(buf) = b.take_owned_data() {
        trace.emit(TraceEvent::DataFreed { handle: view, view: true });
        alloc.free(buf);
        report.data_freed = Some(base);
    }
    remove_slot(registry, trace, base, view, true, report);
    Ok(())
}

fn reclaim_owner<R, A>(
    registry: &mut R,
    alloc: &A,
    trace: &GcTrace,
    handle: ArrayHandle,
    report: &mut FreeReport,
) where
    R: BufferRegistry + ?Sized,
    A: Allocator<Buffer = DataBuffer>,
{
    if let Some(array) = registry.lookup_mut(handle) {
        if let Some(buf) = array.take_owned_data() {
            trace.emit(TraceEvent::DataFreed {
                handle,
                view: false,
            });
            alloc.free(buf);
            report.data_freed = Some(handle);
        }
    }
    remove_slot(registry, trace, handle, handle, false, report);
}

fn remove_slot<R>(
    registry: &mut R,
    trace: &GcTrace,
    handle: ArrayHandle,
    tag: ArrayHandle,
    view: bool,
    report: &mut FreeReport,
) where
    R: BufferRegistry + ?Sized,
{
    if registry.remove(handle).is_some() {
        trace.emit(TraceEvent::SlotRemoved { handle: tag, view });
        report.removed.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayData;
    use crate::buffer::BorrowedRegion;
    use crate::descriptor::Descriptor;
    use crate::registry::SlotRegistry;
    use crate::constructor::StridedConstructor;
    use crate::store::ArrayStore;
    use crate::system::SystemAllocator;

    #[test]
    fn unknown_handle_is_stale() {
        let mut reg = SlotRegistry::new();
        let alloc = SystemAllocator::new();
        let err = free_from_registry(&mut reg, &alloc, &GcTrace::Off, ArrayHandle::new(9));
        assert!(matches!(err, Err(Error::StaleHandle(h)) if h == ArrayHandle::new(9)));
    }

    #[test]
    fn second_cascade_on_persisting_record_is_rejected() {
        let mut s = ArrayStore::new();
        let a = s.create(Descriptor::new(4, 2, 'i', "<i4"), &[2], false).unwrap();
        s.incref(a).unwrap();
        let first = s.free(a).unwrap();
        assert!(first.removed.is_empty());
        assert!(s.get(a).unwrap().is_detached());

        let err = s.free(a);
        assert!(matches!(err, Err(Error::Invariant(_))));
        assert_eq!(s.get(a).unwrap().refcount(), 0);
        assert!(s.get(a).unwrap().owned_bytes().is_some());
    }

    #[test]
    fn view_without_live_base_stops_before_mutation() {
        let mut reg = SlotRegistry::new();
        let alloc = SystemAllocator::new();
        let d = Descriptor::new(4, 1, 'i', "<i4");
        let mut v = CArray::bare();
        v.descriptor = Some(d.share());
        v.dimensions = Some(vec![1]);
        v.strides = Some(vec![4]);
        v.data = ArrayData::View(BorrowedRegion {
            base: ArrayHandle::new(100),
            offset: 0,
            len: 4,
        });
        let h = reg.insert(v);

        let err = free_from_registry(&mut reg, &alloc, &GcTrace::Off, h);
        assert!(matches!(err, Err(Error::Invariant(_))));
        let v = reg.lookup(h).unwrap();
        assert_eq!(v.refcount(), 0);
        assert!(!v.metadata_released());
        assert_eq!(d.refcount(), 1);
    }

    #[test]
    fn owner_cascade_traces_each_step() {
        let mut reg = SlotRegistry::new();
        let alloc = SystemAllocator::new();
        let trace = GcTrace::capture();
        let d = Descriptor::new(2, 3, 'h', "<i2");
        let mut arr = CArray::bare();
        arr.descriptor = Some(d);
        arr.dimensions = Some(vec![3]);
        arr.strides = Some(vec![2]);
        arr.set_owned_data(alloc.alloc(6).unwrap()).unwrap();
        let h = reg.insert(arr);

        let report = free_from_registry(&mut reg, &alloc, &trace, h).unwrap();
        assert_eq!(report.kind, CascadeKind::Owner);
        assert!(report.descriptor_released);
        assert_eq!(report.data_freed, Some(h));
        assert_eq!(report.removed, vec![h]);
        let id = h.get();
        assert_eq!(
            trace.lines(),
            vec![
                format!("[CARRAY_GC_DEBUG][DESCR] Freeing Descriptor from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG] Freeing Dimensions and Strides from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG] Freeing DATA from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG] Freeing CArray ID {}", id),
            ]
        );
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn view_cascade_tags_base_removal_with_view_id() {
        let mut s = ArrayStore::with_parts(
            SystemAllocator::new(),
            SlotRegistry::new(),
            StridedConstructor,
            GcTrace::capture(),
        );
        let base = s.create(Descriptor::new(4, 4, 'i', "<i4"), &[4], false).unwrap();
        let v = s.view(base, &[4], None, 0).unwrap();
        s.free(base).unwrap();
        let report = s.free(v).unwrap();
        assert_eq!(report.removed, vec![base, v]);

        let id = v.get();
        let lines = s.trace().lines();
        assert_eq!(
            lines[1..].to_vec(),
            vec![
                format!("[CARRAY_GC_DEBUG][DESCR][VIEW] Freeing Descriptor from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG][VIEW] Freeing Dimensions and Strides from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG][VIEW] Freeing DATA from CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG][VIEW] Freeing CArray ID {}", id),
                format!("[CARRAY_GC_DEBUG][VIEW] Freeing CArray ID {}", id),
            ]
        );
    }
}
