//! Bulk transfer for trivially copyable element types.
//!
//! A bulk push or pop moves `min(requested, room)` elements with one
//! contiguous copy, or two when the range wraps the storage boundary. The
//! cursor is published once per call, so the counterpart observes the whole
//! batch atomically. Bulk operations are best-effort under every overflow
//! policy: they never block, never evict, and never overflow.

#[cfg(not(loom))]
use std::sync::atomic::Ordering;

#[cfg(loom)]
use loom::sync::atomic::Ordering;

use std::ptr;

use crate::util::Pod;

use super::spsc::{Consumer, Producer};

impl<T: Pod> Producer<T> {
    /// Pushes as much of `src` as fits, returning the number of elements
    /// copied in.
    pub fn try_push_bulk(&mut self, src: &[T]) -> usize {
        let head = self.core.head.load(Ordering::Relaxed);
        let tail = self.core.tail.load(Ordering::Acquire);
        let free = (self.core.capacity - (head - tail)) as usize;
        let n = src.len().min(free);
        if n == 0 {
            return 0;
        }

        let idx = (head & self.core.mask) as usize;
        let prefix = n.min(self.core.capacity as usize - idx);

        // SAFETY: slots [head, head + n) are free (n <= capacity -
        // occupancy); the split keeps both copies inside the storage. The
        // consumer reads nothing past the published head.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.core.data_ptr().add(idx), prefix);
            if prefix < n {
                ptr::copy_nonoverlapping(
                    src.as_ptr().add(prefix),
                    self.core.data_ptr(),
                    n - prefix,
                );
            }
        }

        self.core.head.store(head + n as u64, Ordering::Release);
        n
    }
}

impl<T: Pod> Consumer<T> {
    /// Pops up to `dst.len()` elements into `dst`, returning the number
    /// copied out.
    pub fn try_pop_bulk(&mut self, dst: &mut [T]) -> usize {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        let occupancy = (head - tail) as usize;
        let n = dst.len().min(occupancy);
        if n == 0 {
            return 0;
        }

        let idx = (tail & self.core.mask) as usize;
        let prefix = n.min(self.core.capacity as usize - idx);

        // SAFETY: slots [tail, tail + n) are published; the split keeps both
        // copies inside the storage. The producer writes nothing before the
        // published tail.
        unsafe {
            ptr::copy_nonoverlapping(self.core.data_ptr().add(idx), dst.as_mut_ptr(), prefix);
            if prefix < n {
                ptr::copy_nonoverlapping(
                    self.core.data_ptr(),
                    dst.as_mut_ptr().add(prefix),
                    n - prefix,
                );
            }
        }

        self.core.tail.store(tail + n as u64, Ordering::Release);
        n
    }
}
