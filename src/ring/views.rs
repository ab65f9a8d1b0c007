//! Borrowed zero-copy views into ring storage.
//!
//! Views are the contract between the cursor protocol and direct slot
//! access: a read view covers `[tail, tail + n)` and is valid while the
//! consumer handle is borrowed; a write view covers `[head, head + n)` and
//! exclusively borrows the producer handle. The opposite side keeps running —
//! that is the point — but it never touches the covered range until the view
//! commits and the owning cursor advances.
//!
//! Write views commit explicitly. Dropping one without committing publishes
//! nothing (equivalent to `commit(0)`); the written bytes are abandoned.
//!
//! All view APIs require `T: Pod`: slots are exposed as plain element slices,
//! which is only sound for types where every bit pattern is valid and no
//! destructor exists (ring storage is zero-filled at allocation, so even
//! never-written slots hold valid values).

use std::error::Error;
use std::fmt;
use std::slice;

#[cfg(not(loom))]
use std::sync::atomic::Ordering;

#[cfg(loom)]
use loom::sync::atomic::Ordering;

use crate::stdx::InlineVec;
use crate::util::Pod;

use super::spsc::{Consumer, Producer};

/// Up to two immutable segments covering consumer-visible elements in FIFO
/// order. The second segment is empty unless the range wraps.
pub type ReadSegments<'a, T> = InlineVec<&'a [T], 2>;

/// Consumer-side cursor errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// `advance_read(n)` asked to release more elements than are visible.
    AdvanceOutOfRange { requested: usize, available: usize },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::AdvanceOutOfRange {
                requested,
                available,
            } => write!(
                f,
                "cannot advance read cursor by {requested}: only {available} elements visible"
            ),
        }
    }
}

impl Error for RingError {}

/// Write-view commit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    /// `commit(n)` exceeded the view's reserved capacity.
    OverCommit { committed: usize, capacity: usize },
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::OverCommit {
                committed,
                capacity,
            } => write!(
                f,
                "commit of {committed} elements exceeds view capacity {capacity}"
            ),
        }
    }
}

impl Error for ViewError {}

// ============================================================================
// Read views
// ============================================================================

impl<T: Pod> Consumer<T> {
    /// Returns a single contiguous view of up to `max` readable elements.
    ///
    /// The view never wraps: its length is `min(occupancy, max, capacity -
    /// (tail & mask))`. It borrows the consumer, so the read cursor cannot
    /// move while it is alive.
    pub fn contiguous_read_view(&self, max: usize) -> &[T] {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        let occupancy = (head - tail) as usize;
        let idx = (tail & self.core.mask) as usize;
        let len = occupancy
            .min(max)
            .min(self.core.capacity as usize - idx);

        // SAFETY: slots [tail, tail + len) are published (len <= occupancy)
        // and contiguous (len <= capacity - idx). The producer cannot reuse
        // them until `tail` advances, which requires `&mut self`.
        unsafe { slice::from_raw_parts(self.core.slot(tail), len) }
    }

    /// Returns one or two segments covering up to `max` readable elements.
    ///
    /// Combined length is `min(occupancy, max)`; the second segment is
    /// present only when the range wraps the storage boundary.
    pub fn read_views(&self, max: usize) -> ReadSegments<'_, T> {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        let occupancy = (head - tail) as usize;
        let len = occupancy.min(max);

        let mut segments = ReadSegments::new();
        if len == 0 {
            return segments;
        }

        let idx = (tail & self.core.mask) as usize;
        let first = len.min(self.core.capacity as usize - idx);

        // SAFETY: as in `contiguous_read_view`; the wrapped remainder starts
        // at slot 0 and covers `len - first` published slots.
        unsafe {
            segments.push(slice::from_raw_parts(self.core.slot(tail), first));
            if first < len {
                segments.push(slice::from_raw_parts(self.core.data_ptr(), len - first));
            }
        }
        segments
    }

    /// Releases `n` elements previously observed through read views.
    ///
    /// Fails without moving the cursor if `n` exceeds current occupancy.
    pub fn advance_read(&mut self, n: usize) -> Result<(), RingError> {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        let occupancy = (head - tail) as usize;
        if n > occupancy {
            return Err(RingError::AdvanceOutOfRange {
                requested: n,
                available: occupancy,
            });
        }
        self.core.tail.store(tail + n as u64, Ordering::Release);
        Ok(())
    }
}

// ============================================================================
// Write views
// ============================================================================

impl<T: Pod> Producer<T> {
    /// Reserves a single contiguous writable region of up to `max` slots.
    ///
    /// The view's length is `min(free, max, capacity - (head & mask))` — it
    /// never wraps. An empty view is returned when the ring is full.
    pub fn write_view(&mut self, max: usize) -> WriteView<'_, T> {
        let head = self.core.head.load(Ordering::Relaxed);
        let tail = self.core.tail.load(Ordering::Acquire);
        let free = (self.core.capacity - (head - tail)) as usize;
        let idx = (head & self.core.mask) as usize;
        let len = free.min(max).min(self.core.capacity as usize - idx);

        WriteView {
            producer: self,
            base: head,
            len,
        }
    }

    /// Reserves up to `max` writable slots as one or two segments.
    ///
    /// Combined capacity is `min(free, max)`; the second segment appears when
    /// the reservation wraps the storage boundary.
    pub fn write_segments(&mut self, max: usize) -> WriteSegments<'_, T> {
        let head = self.core.head.load(Ordering::Relaxed);
        let tail = self.core.tail.load(Ordering::Acquire);
        let free = (self.core.capacity - (head - tail)) as usize;
        let total = free.min(max);
        let idx = (head & self.core.mask) as usize;
        let first = total.min(self.core.capacity as usize - idx);

        WriteSegments {
            producer: self,
            base: head,
            first,
            second: total - first,
        }
    }
}

/// Contiguous mutable view over reserved producer slots.
///
/// Commit with [`WriteView::commit`] to publish the first `n` written
/// elements; dropping the view uncommitted publishes nothing.
pub struct WriteView<'a, T: Pod> {
    producer: &'a mut Producer<T>,
    /// Producer cursor at reservation time.
    base: u64,
    len: usize,
}

impl<'a, T: Pod> WriteView<'a, T> {
    /// Number of slots reserved.
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Returns true when no slots could be reserved.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The reserved slots as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: [base, base + len) are free slots (len <= capacity -
        // occupancy) reachable only through this view; the consumer reads
        // only published slots. Zero-filled storage makes the contents valid
        // `Pod` values even before the first write.
        unsafe { slice::from_raw_parts_mut(self.producer.core.slot(self.base), self.len) }
    }

    /// Copies from `src` into the front of the view, returning the number of
    /// elements copied (`min(src.len(), capacity)`).
    pub fn write(&mut self, src: &[T]) -> usize {
        let n = src.len().min(self.len);
        self.as_mut_slice()[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Publishes the first `n` written elements and consumes the view.
    ///
    /// Fails (publishing nothing) if `n` exceeds the reserved capacity.
    pub fn commit(self, n: usize) -> Result<(), ViewError> {
        if n > self.len {
            return Err(ViewError::OverCommit {
                committed: n,
                capacity: self.len,
            });
        }
        self.producer
            .core
            .head
            .store(self.base + n as u64, Ordering::Release);
        Ok(())
    }
}

impl<'a, T: Pod> std::ops::Deref for WriteView<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: as in `as_mut_slice`.
        unsafe { slice::from_raw_parts(self.producer.core.slot(self.base), self.len) }
    }
}

impl<'a, T: Pod> std::ops::DerefMut for WriteView<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

/// Mutable view over reserved producer slots that may wrap the storage
/// boundary, exposing one or two segments.
///
/// Elements written across both segments are logically contiguous; commit
/// order follows segment order.
pub struct WriteSegments<'a, T: Pod> {
    producer: &'a mut Producer<T>,
    base: u64,
    first: usize,
    second: usize,
}

impl<'a, T: Pod> WriteSegments<'a, T> {
    /// Combined capacity across both segments.
    pub fn total_capacity(&self) -> usize {
        self.first + self.second
    }

    /// Number of non-empty segments (0, 1, or 2).
    pub fn segment_count(&self) -> usize {
        match (self.first, self.second) {
            (0, _) => 0,
            (_, 0) => 1,
            _ => 2,
        }
    }

    /// Both segments as mutable slices; the second is empty when the
    /// reservation does not wrap.
    pub fn as_mut_slices(&mut self) -> (&mut [T], &mut [T]) {
        // SAFETY: the two ranges are disjoint — [base & mask, base & mask +
        // first) at the end of storage and [0, second) at the start — and
        // cover only free slots, as in `WriteView::as_mut_slice`.
        unsafe {
            (
                slice::from_raw_parts_mut(self.producer.core.slot(self.base), self.first),
                slice::from_raw_parts_mut(self.producer.core.data_ptr(), self.second),
            )
        }
    }

    /// Copies from `src` sequentially across the segments, returning the
    /// number of elements copied.
    pub fn write(&mut self, src: &[T]) -> usize {
        let (a, b) = self.as_mut_slices();
        let take_a = src.len().min(a.len());
        a[..take_a].copy_from_slice(&src[..take_a]);
        let take_b = (src.len() - take_a).min(b.len());
        b[..take_b].copy_from_slice(&src[take_a..take_a + take_b]);
        take_a + take_b
    }

    /// Publishes the first `n` written elements and consumes the view.
    pub fn commit(self, n: usize) -> Result<(), ViewError> {
        let capacity = self.first + self.second;
        if n > capacity {
            return Err(ViewError::OverCommit {
                committed: n,
                capacity,
            });
        }
        self.producer
            .core
            .head
            .store(self.base + n as u64, Ordering::Release);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
