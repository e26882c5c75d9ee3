//! Support traits for allocating and resetting the large histogram buffers.

use std::alloc;

/// A trait for types whose zero value is the all-zeros bit pattern,
/// allowing them to be allocated directly on the heap as zeroed memory.
///
/// The histogram and lookup grids are far too large for the stack, so they
/// are created with [`ZeroedIsZero::box_zeroed`] and reset in place with
/// [`ZeroedIsZero::fill_zero`].
///
/// # Safety
/// The zero value of the type must be representable by the all-zeros bit pattern.
#[allow(unsafe_code)]
pub unsafe trait ZeroedIsZero: Sized + Copy {
    /// Allocates the zero value on the heap.
    #[must_use]
    fn box_zeroed() -> Box<Self> {
        unsafe {
            let layout = alloc::Layout::new::<Self>();
            let ptr = alloc::alloc_zeroed(layout).cast::<Self>();
            if ptr.is_null() {
                alloc::handle_alloc_error(layout)
            }
            Box::from_raw(ptr)
        }
    }

    /// Resets the value to all zeros in place, without materializing a
    /// zeroed temporary (the grids this is used on are tens of megabytes).
    fn fill_zero(&mut self) {
        unsafe { std::ptr::write_bytes(std::ptr::from_mut(self), 0, 1) }
    }
}

#[allow(unsafe_code)]
unsafe impl ZeroedIsZero for u8 {}

#[allow(unsafe_code)]
unsafe impl ZeroedIsZero for u32 {}

#[allow(unsafe_code)]
unsafe impl ZeroedIsZero for u64 {}

#[allow(unsafe_code)]
unsafe impl ZeroedIsZero for f64 {}

#[allow(unsafe_code)]
unsafe impl<T: ZeroedIsZero, const N: usize> ZeroedIsZero for [T; N] {}
