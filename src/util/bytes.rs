//! Byte-level marker traits and cursor arithmetic.
//!
//! These helpers are intentionally explicit about safety and layout
//! assumptions. We avoid external "bytemuck"-style dependencies here so the
//! invariants are visible at the call site and easy to audit.

use core::mem::size_of;
use core::slice;

/// Marker for element types that may cross the zero-copy paths.
///
/// # Safety
///
/// Implementers guarantee all of the following:
/// - The type is trivially copyable (`Copy`, no drop glue).
/// - It has no padding bytes, so any value may be viewed as raw bytes.
/// - Every initialized bit pattern is a valid value, so ring storage that was
///   zero-filled at allocation may be exposed through a write view before the
///   first element is stored.
pub unsafe trait Pod: Copy {}

unsafe impl Pod for u8 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for u64 {}
unsafe impl Pod for usize {}
unsafe impl Pod for i8 {}
unsafe impl Pod for i16 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for i64 {}
unsafe impl Pod for isize {}
unsafe impl Pod for f32 {}
unsafe impl Pod for f64 {}
unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

/// Reinterprets a `Pod` slice as its underlying bytes.
///
/// # Panics
///
/// Panics if `T` is a ZST.
#[inline]
pub fn as_byte_slice<T: Pod>(v: &[T]) -> &[u8] {
    const { assert!(size_of::<T>() > 0) };

    // SAFETY: `Pod` guarantees no padding and full initialization, and the
    // returned borrow keeps `v` alive.
    unsafe { slice::from_raw_parts(v.as_ptr().cast::<u8>(), core::mem::size_of_val(v)) }
}

/// Rebuilds a 64-bit monotonic cursor from its 32-bit wire representation.
///
/// The wire carries only the low 32 bits. Given the last locally observed
/// 64-bit value, the true cursor is the one whose low half matches `wire` and
/// that lies within `u32::MAX` of `prev`. Cursors only move forward, so the
/// wrapping difference of the low halves is the exact advance.
#[inline]
pub fn widen_cursor(prev: u64, wire: u32) -> u64 {
    prev + u64::from(wire.wrapping_sub(prev as u32))
}
