//! Allocation helpers over the `Allocator` interface.

use std::any::Any;
use std::rc::Rc;

use carray_core::alloc::{checked_size, Allocator};
use carray_core::flags::ArrayFlags;

use crate::array::CArray;
use crate::buffer::DataBuffer;
use crate::constructor::{ArrayConstructor, ArrayRequest};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// `count * element_size` bytes with unspecified contents.
pub fn allocate<A>(alloc: &A, count: usize, element_size: usize) -> Result<DataBuffer>
where
    A: Allocator<Buffer = DataBuffer>,
{
    let bytes = checked_size(count, element_size)?;
    let buf = alloc.alloc(bytes)?;
    exact(alloc, buf, bytes)
}

/// `count * element_size` zeroed bytes.
pub fn allocate_zeroed<A>(alloc: &A, count: usize, element_size: usize) -> Result<DataBuffer>
where
    A: Allocator<Buffer = DataBuffer>,
{
    let bytes = checked_size(count, element_size)?;
    let buf = alloc.zeroed_alloc(count, element_size)?;
    exact(alloc, buf, bytes)
}

// A short buffer from a misbehaving allocator goes straight back.
fn exact<A>(alloc: &A, buf: DataBuffer, bytes: usize) -> Result<DataBuffer>
where
    A: Allocator<Buffer = DataBuffer>,
{
    if buf.len() != bytes {
        let got = buf.len();
        alloc.free(buf);
        return Err(Error::AllocFailed {
            bytes,
            reason: format!("allocator returned {} bytes", got),
        });
    }
    Ok(buf)
}

/// Allocate `capacity_hint * element_size` bytes from `a`'s descriptor and
/// attach them as `a`'s owned data.
pub fn array_data_alloc<A>(alloc: &A, a: &mut CArray) -> Result<()>
where
    A: Allocator<Buffer = DataBuffer>,
{
    if !a.owns_data() {
        return Err(Error::Invariant("views never allocate data".into()));
    }
    if a.owned_bytes().is_some() {
        return Err(Error::Invariant("array already holds a data buffer".into()));
    }
    let (count, size) = match a.descriptor() {
        Some(d) => (d.capacity_hint(), d.element_size()),
        None => return Err(Error::Invariant("array has no descriptor".into())),
    };
    let buf = allocate(alloc, count, size)?;
    a.set_owned_data(buf)
}

/// Allocate a bare record and let `ctor` populate it.
pub fn array_alloc<A, C>(
    ctor: &C,
    alloc: &A,
    descriptor: Descriptor,
    ndim: usize,
    dims: &[usize],
    is_fortran: bool,
    interface_data: Option<Rc<dyn Any>>,
) -> Result<CArray>
where
    A: Allocator<Buffer = DataBuffer>,
    C: ArrayConstructor,
{
    if ndim != dims.len() {
        return Err(Error::Invariant(format!(
            "ndim {} does not match {} dimensions",
            ndim,
            dims.len()
        )));
    }
    let flags = if is_fortran {
        ArrayFlags::F_CONTIGUOUS
    } else {
        ArrayFlags::NONE
    };
    let request = ArrayRequest {
        dims,
        strides: None,
        data: None,
        flags,
        interface_data,
    };
    ctor.new_from_descriptor(alloc, CArray::bare(), descriptor, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::StridedConstructor;
    use crate::system::SystemAllocator;

    #[test]
    fn allocate_sizes_exactly() {
        let alloc = SystemAllocator::new();
        let buf = allocate(&alloc, 7, 3).unwrap();
        assert_eq!(buf.len(), 21);
        let zeros = allocate_zeroed(&alloc, 5, 8).unwrap();
        assert_eq!(zeros.len(), 40);
        assert!(zeros.iter().all(|b| *b == 0));
    }

    #[test]
    fn overflow_is_alloc_failure() {
        let alloc = SystemAllocator::new();
        assert!(matches!(
            allocate(&alloc, usize::MAX, 16),
            Err(Error::AllocFailed { .. })
        ));
        assert_eq!(alloc.stats().allocations, 0);
    }

    #[test]
    fn data_alloc_uses_descriptor_capacity() {
        let alloc = SystemAllocator::new();
        let d = Descriptor::new(4, 10, 'i', "<i4");
        let mut a = array_alloc(&StridedConstructor, &alloc, d, 1, &[3], false, None).unwrap();
        let buf = a.take_owned_data().unwrap();
        alloc.free(buf);
        array_data_alloc(&alloc, &mut a).unwrap();
        assert_eq!(a.owned_bytes().map(<[u8]>::len), Some(40));
        assert!(matches!(
            array_data_alloc(&alloc, &mut a),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn fortran_request_sets_layout_flag() {
        let alloc = SystemAllocator::new();
        let d = Descriptor::new(8, 6, 'd', "<f8");
        let a = array_alloc(&StridedConstructor, &alloc, d, 2, &[2, 3], true, None).unwrap();
        assert!(a.flags().contains(ArrayFlags::F_CONTIGUOUS));
        assert!(!a.flags().contains(ArrayFlags::C_CONTIGUOUS));
        assert_eq!(a.strides(), Some(&[8isize, 16][..]));
    }

    #[test]
    fn ndim_mismatch_is_invariant_violation() {
        let alloc = SystemAllocator::new();
        let d = Descriptor::new(4, 4, 'i', "<i4");
        let err = array_alloc(&StridedConstructor, &alloc, d, 3, &[2, 2], false, None);
        assert!(matches!(err, Err(Error::Invariant(_))));
    }
}
