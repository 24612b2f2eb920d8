//! Array constructor: computes strides and contiguity and populates a bare
//! record.

use std::any::Any;
use std::rc::Rc;

use carray_core::alloc::{checked_size, Allocator};
use carray_core::flags::ArrayFlags;

use crate::allocation::allocate;
use crate::array::{ArrayData, CArray};
use crate::buffer::DataBuffer;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// Everything a constructor needs besides the descriptor.
pub struct ArrayRequest<'a> {
    pub dims: &'a [usize],
    /// `None` computes contiguous strides (Fortran order if `flags` asks).
    pub strides: Option<&'a [isize]>,
    /// `None` allocates a fresh owned buffer.
    pub data: Option<ArrayData>,
    pub flags: ArrayFlags,
    /// Opaque host payload, stored on the record untouched.
    pub interface_data: Option<Rc<dyn Any>>,
}

pub trait ArrayConstructor {
    /// Populate `target` (a [`CArray::bare`] record) from `descriptor`.
    ///
    /// The descriptor reference is moved into the array; the caller takes it
    /// with [`Descriptor::share`] when it is shared.
    fn new_from_descriptor<A>(
        &self,
        alloc: &A,
        target: CArray,
        descriptor: Descriptor,
        request: ArrayRequest<'_>,
    ) -> Result<CArray>
    where
        A: Allocator<Buffer = DataBuffer>;
}

/// Default constructor for strided, possibly Fortran-ordered arrays.
#[derive(Debug, Default, Clone, Copy)]
pub struct StridedConstructor;

impl ArrayConstructor for StridedConstructor {
    fn new_from_descriptor<A>(
        &self,
        alloc: &A,
        mut target: CArray,
        descriptor: Descriptor,
        request: ArrayRequest<'_>,
    ) -> Result<CArray>
    where
        A: Allocator<Buffer = DataBuffer>,
    {
        if !target.is_bare() {
            return Err(Error::Invariant("constructor target is not bare".into()));
        }
        let elsize = descriptor.element_size();
        if elsize == 0 {
            return Err(Error::Invariant("descriptor element size is zero".into()));
        }
        let dims = request.dims;
        let count = element_count(dims)?;
        let nbytes = checked_size(count, elsize)?;

        let mut flags = request.flags;
        flags.remove(ArrayFlags::C_CONTIGUOUS | ArrayFlags::F_CONTIGUOUS | ArrayFlags::OWNDATA);
        let c_strides = contiguous_strides(dims, elsize, false)?;
        let f_strides = contiguous_strides(dims, elsize, true)?;
        let strides = match request.strides {
            Some(s) if s.len() != dims.len() => {
                return Err(Error::Invariant(format!(
                    "{} strides for {} dimensions",
                    s.len(),
                    dims.len()
                )));
            }
            Some(s) => s.to_vec(),
            None if request.flags.contains(ArrayFlags::F_CONTIGUOUS) => f_strides.clone(),
            None => c_strides.clone(),
        };
        if strides == c_strides {
            flags.insert(ArrayFlags::C_CONTIGUOUS);
        }
        if strides == f_strides {
            flags.insert(ArrayFlags::F_CONTIGUOUS);
        }
        flags.insert(ArrayFlags::ALIGNED);

        match request.data {
            None => {
                let buf = allocate(alloc, count, elsize)?;
                target.set_owned_data(buf)?;
                flags.insert(ArrayFlags::WRITEABLE);
            }
            Some(ArrayData::Owned(Some(buf))) => {
                if buf.len() < nbytes {
                    let got = buf.len();
                    alloc.free(buf);
                    return Err(Error::Invariant(format!(
                        "buffer of {} bytes cannot hold {} bytes",
                        got, nbytes
                    )));
                }
                target.set_owned_data(buf)?;
                flags.insert(ArrayFlags::WRITEABLE);
            }
            Some(ArrayData::Owned(None)) => {
                return Err(Error::Invariant("owned data without a buffer".into()));
            }
            Some(ArrayData::View(region)) => {
                target.data = ArrayData::View(region);
            }
        }

        target.flags |= flags;
        target.interface = request.interface_data;
        target.dimensions = Some(dims.to_vec());
        target.strides = Some(strides);
        target.descriptor = Some(descriptor);
        Ok(target)
    }
}

/// Product of `dims`; overflow is an allocation failure.
pub fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| checked_size(acc, d))
        .map_err(Error::from)
}

/// Byte strides of a contiguous layout, C order unless `fortran`.
pub fn contiguous_strides(dims: &[usize], elsize: usize, fortran: bool) -> Result<Vec<isize>> {
    let overflow = || Error::Invariant("stride overflow".into());
    let mut strides = vec![0isize; dims.len()];
    let mut step = isize::try_from(elsize).map_err(|_| overflow())?;
    let order: Box<dyn Iterator<Item = usize>> = if fortran {
        Box::new(0..dims.len())
    } else {
        Box::new((0..dims.len()).rev())
    };
    for i in order {
        strides[i] = step;
        let d = isize::try_from(dims[i].max(1)).map_err(|_| overflow())?;
        step = step.checked_mul(d).ok_or_else(overflow)?;
    }
    Ok(strides)
}

/// Byte range `[low, high)` touched by a strided layout, relative to the
/// first element. Empty arrays touch nothing.
pub fn byte_span(dims: &[usize], strides: &[isize], elsize: usize) -> Result<(isize, isize)> {
    let overflow = || Error::Invariant("view extent overflow".into());
    if dims.len() != strides.len() {
        return Err(Error::Invariant(format!(
            "{} strides for {} dimensions",
            strides.len(),
            dims.len()
        )));
    }
    if dims.iter().any(|&d| d == 0) {
        return Ok((0, 0));
    }
    let mut low = 0isize;
    let mut high = isize::try_from(elsize).map_err(|_| overflow())?;
    for (&d, &s) in dims.iter().zip(strides) {
        let reach = isize::try_from(d - 1)
            .ok()
            .and_then(|n| n.checked_mul(s))
            .ok_or_else(overflow)?;
        if reach < 0 {
            low = low.checked_add(reach).ok_or_else(overflow)?;
        } else {
            high = high.checked_add(reach).ok_or_else(overflow)?;
        }
    }
    Ok((low, high))
}
