//! Shared ring core, split handles, and element operations.
//!
//! # Design
//!
//! A wait-free SPSC ring in the Rigtorp/rtrb lineage: power-of-two capacity
//! with bitwise masking, `MaybeUninit<T>` slot storage behind `UnsafeCell`,
//! cache-line-padded cursor atomics, and cached remote indices so the hot
//! paths touch the opposite side's cache line only when they appear stuck.
//!
//! # Cursors
//!
//! `head` is the producer cursor (next slot to write), `tail` the consumer
//! cursor (next slot to read). Both increase monotonically over the 64-bit
//! space and never wrap under realistic use; the slot for cursor `c` is
//! `c & mask`. Invariants:
//!
//! - `head >= tail` at every observable point.
//! - `head - tail <= capacity` (occupancy bound).
//! - Only the producer stores `head`; only the consumer stores `tail`, with
//!   one exception: overwrite-policy eviction claims the oldest slot via a
//!   `compare_exchange` on `tail`, so a racing consumer pop simply wins and
//!   leaves space.
//!
//! # Safety
//!
//! Uses `unsafe` for `MaybeUninit` slot access. A slot is written only after
//! it is confirmed free (via `tail`) and read only after it is confirmed
//! published (via `head`). Storage is zero-filled at allocation so `Pod`
//! slots hold valid values even before their first write, which the write
//! views in [`super::views`] rely on.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Arc;

use crossbeam_utils::{Backoff, CachePadded};

/// Behavior of a push against a full ring, chosen at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Busy-wait until the consumer frees a slot: bounded spin, then
    /// `thread::yield_now` per retry. No parking primitive is involved, so a
    /// producer blocked for long stretches burns scheduler quanta; callers
    /// that expect long stalls should prefer `Drop` plus their own waiting.
    Block,
    /// Reject the push and hand the value back to the caller.
    Drop,
    /// Evict the oldest element (destroying it) and push in its place.
    Overwrite,
}

/// Shared storage backing one ring. Producer and consumer handles hold it
/// through an `Arc`; the last handle drops remaining elements.
pub(crate) struct RingCore<T> {
    /// Slot storage, `capacity` entries. Zero-filled at allocation.
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    pub(crate) capacity: u64,
    pub(crate) mask: u64,
    policy: OverflowPolicy,
    /// Producer cursor: next slot to write.
    pub(crate) head: CachePadded<AtomicU64>,
    /// Consumer cursor: next slot to read.
    pub(crate) tail: CachePadded<AtomicU64>,
}

// SAFETY: the cursor protocol ensures producer and consumer access disjoint
// slots; the handles enforce single-threaded use of each side via `&mut`.
unsafe impl<T: Send> Send for RingCore<T> {}
unsafe impl<T: Send> Sync for RingCore<T> {}

fn alloc_slots<T>(len: usize) -> Box<[UnsafeCell<MaybeUninit<T>>]> {
    let layout = Layout::array::<UnsafeCell<MaybeUninit<T>>>(len)
        .expect("ring capacity overflows allocation layout");
    // Zero-filled so Pod slots are valid values before their first write.
    let raw = unsafe { alloc_zeroed(layout) };
    if raw.is_null() {
        handle_alloc_error(layout);
    }
    // SAFETY: `raw` is a fresh allocation of exactly `len` slots with the
    // layout computed above; zeroed bytes are a valid MaybeUninit state.
    unsafe {
        Box::from_raw(ptr::slice_from_raw_parts_mut(
            raw.cast::<UnsafeCell<MaybeUninit<T>>>(),
            len,
        ))
    }
}

impl<T> RingCore<T> {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        assert!(std::mem::size_of::<T>() > 0, "zero-sized elements are not supported");
        let capacity = capacity.next_power_of_two();
        assert!(
            capacity <= 1 << 31,
            "ring capacity must fit the 32-bit cursor wire format"
        );

        Self {
            buf: alloc_slots(capacity),
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            policy,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Raw pointer to slot storage viewed as elements.
    ///
    /// `UnsafeCell<MaybeUninit<T>>` is layout-compatible with `T`, so the
    /// buffer doubles as a `T` array for bulk copies and views.
    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut T {
        self.buf.as_ptr() as *mut T
    }

    /// Pointer to the slot addressed by cursor `at`.
    #[inline]
    pub(crate) fn slot(&self, at: u64) -> *mut T {
        // SAFETY: `at & mask < capacity` by construction.
        unsafe { self.data_ptr().add((at & self.mask) as usize) }
    }
}

impl<T> Drop for RingCore<T> {
    fn drop(&mut self) {
        // Drain remaining elements so destructors run. Both handles are gone,
        // so plain loads are sufficient.
        if std::mem::needs_drop::<T>() {
            let head = self.head.load(Ordering::Relaxed);
            let mut at = self.tail.load(Ordering::Relaxed);
            while at != head {
                // SAFETY: slots in [tail, head) are initialized.
                unsafe { ptr::drop_in_place(self.slot(at)) };
                at += 1;
            }
        }
    }
}

/// Creates a ring with the given capacity (rounded up to the next power of
/// two) and overflow policy, returning its producer and consumer handles.
///
/// Each handle may be moved to its own thread. The storage is freed, after
/// draining any remaining elements, when the second handle drops.
///
/// # Panics
///
/// Panics if `capacity` is zero, exceeds `2^31`, or `T` is zero-sized.
pub fn channel<T: Send>(capacity: usize, policy: OverflowPolicy) -> (Producer<T>, Consumer<T>) {
    let core = Arc::new(RingCore::new(capacity, policy));
    (
        Producer {
            core: Arc::clone(&core),
            cached_tail: 0,
        },
        Consumer {
            core,
            cached_head: 0,
        },
    )
}

// ============================================================================
// Producer
// ============================================================================

/// Producer handle: the single writer of a ring.
///
/// Caches the consumer's `tail` and refreshes it only when the ring appears
/// full, keeping the common push off the consumer's cache line.
pub struct Producer<T> {
    pub(crate) core: Arc<RingCore<T>>,
    cached_tail: u64,
}

// SAFETY: one thread at a time uses the producer (enforced by `&mut`).
unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Attempts to push `value`.
    ///
    /// Policy behavior on a full ring: `Block` busy-waits for space, `Drop`
    /// returns `Err(value)`, `Overwrite` evicts the oldest element and always
    /// succeeds.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let head = self.core.head.load(Ordering::Relaxed);
        if !self.reserve(head) {
            return Err(value);
        }

        // SAFETY: `reserve` confirmed the slot at `head` is free; the
        // consumer will not read it until `head` is published below.
        unsafe { self.core.slot(head).write(value) };
        self.core.head.store(head + 1, Ordering::Release);
        Ok(())
    }

    /// Attempts to push the value produced by `make`, constructing it
    /// directly in the slot.
    ///
    /// On a full `Drop`-policy ring the closure is handed back unevaluated.
    #[inline]
    pub fn try_push_with<F>(&mut self, make: F) -> Result<(), F>
    where
        F: FnOnce() -> T,
    {
        let head = self.core.head.load(Ordering::Relaxed);
        if !self.reserve(head) {
            return Err(make);
        }

        // SAFETY: as in `try_push`; the closure's result is written in place.
        unsafe { self.core.slot(head).write(make()) };
        self.core.head.store(head + 1, Ordering::Release);
        Ok(())
    }

    /// Number of elements currently in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.core.head.load(Ordering::Relaxed);
        let tail = self.core.tail.load(Ordering::Acquire);
        (head - tail) as usize
    }

    /// Returns true when no elements are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when occupancy equals capacity.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() as u64 == self.core.capacity
    }

    /// Free slots remaining.
    #[inline]
    pub fn available(&self) -> usize {
        (self.core.capacity as usize) - self.len()
    }

    /// Ring capacity (power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Surrenders the handle, exposing the shared core to a pipe stage that
    /// takes over this side of the ring.
    pub(crate) fn into_core(self) -> Arc<RingCore<T>> {
        self.core
    }

    /// Ensures the slot at `head` is free, per the ring's overflow policy.
    /// Returns false only under `Drop` with a full ring.
    #[inline]
    fn reserve(&mut self, head: u64) -> bool {
        if head - self.cached_tail < self.core.capacity {
            return true;
        }
        self.cached_tail = self.core.tail.load(Ordering::Acquire);
        if head - self.cached_tail < self.core.capacity {
            return true;
        }

        match self.core.policy {
            OverflowPolicy::Drop => false,
            OverflowPolicy::Block => {
                let backoff = Backoff::new();
                loop {
                    backoff.snooze();
                    self.cached_tail = self.core.tail.load(Ordering::Acquire);
                    if head - self.cached_tail < self.core.capacity {
                        return true;
                    }
                }
            }
            OverflowPolicy::Overwrite => {
                self.evict_oldest();
                true
            }
        }
    }

    /// Claims and destroys the oldest element to make room.
    ///
    /// The claim is a CAS on `tail`: if the consumer pops concurrently it
    /// wins the race, which also frees a slot, so either outcome leaves room.
    fn evict_oldest(&mut self) {
        loop {
            let tail = self.core.tail.load(Ordering::Acquire);
            let head = self.core.head.load(Ordering::Relaxed);
            if head - tail < self.core.capacity {
                // Consumer made space while we were deciding.
                self.cached_tail = tail;
                return;
            }
            match self.core.tail.compare_exchange(
                tail,
                tail + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if std::mem::needs_drop::<T>() {
                        // SAFETY: the CAS transferred ownership of the slot at
                        // `tail` to us; it held an initialized element.
                        unsafe { ptr::drop_in_place(self.core.slot(tail)) };
                    }
                    self.cached_tail = tail + 1;
                    return;
                }
                Err(_) => continue,
            }
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Consumer handle: the single reader of a ring.
///
/// Caches the producer's `head` and refreshes it only when the ring appears
/// empty.
pub struct Consumer<T> {
    pub(crate) core: Arc<RingCore<T>>,
    cached_head: u64,
}

// SAFETY: one thread at a time uses the consumer (enforced by `&mut`).
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Removes and returns the oldest element, or `None` when empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let tail = self.core.tail.load(Ordering::Relaxed);
        if tail == self.cached_head {
            self.cached_head = self.core.head.load(Ordering::Acquire);
            if tail == self.cached_head {
                return None;
            }
        }

        // SAFETY: `tail < head`, so the slot is initialized; the producer
        // will not reuse it until `tail` is published below.
        let value = unsafe { self.core.slot(tail).read() };
        self.core.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }

    /// Borrows the oldest element without removing it.
    ///
    /// The borrow ties up the consumer handle, so the slot cannot be released
    /// (and therefore cannot be overwritten by the producer) while it lives.
    #[inline]
    pub fn try_peek(&self) -> Option<&T> {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        // SAFETY: slot at `tail` is initialized and stays untouched by the
        // producer while `tail` is unchanged; `&self` blocks `try_pop`.
        Some(unsafe { &*self.core.slot(tail) })
    }

    /// Number of elements currently in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.core.tail.load(Ordering::Relaxed);
        let head = self.core.head.load(Ordering::Acquire);
        (head - tail) as usize
    }

    /// Returns true when no elements are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when occupancy equals capacity.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() as u64 == self.core.capacity
    }

    /// Free slots remaining.
    #[inline]
    pub fn available(&self) -> usize {
        (self.core.capacity as usize) - self.len()
    }

    /// Ring capacity (power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Surrenders the handle, exposing the shared core to a pipe stage that
    /// takes over this side of the ring.
    pub(crate) fn into_core(self) -> Arc<RingCore<T>> {
        self.core
    }

    /// Removes all elements, running destructors.
    ///
    /// For trivially destructible element types this is a single cursor snap
    /// to the producer's published `head`.
    pub fn clear(&mut self) {
        if !std::mem::needs_drop::<T>() {
            let head = self.core.head.load(Ordering::Acquire);
            self.core.tail.store(head, Ordering::Release);
            self.cached_head = head;
            return;
        }
        while self.try_pop().is_some() {}
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Loom Tests
// ============================================================================

#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::thread;

    /// FIFO order under loom's exhaustive interleaving of the cursor protocol.
    #[test]
    fn loom_spsc_fifo() {
        const K: u64 = 3;

        loom::model(|| {
            let core = std::sync::Arc::new(RingCore::<u64>::new(4, OverflowPolicy::Drop));

            let mut tx = Producer {
                core: std::sync::Arc::clone(&core),
                cached_tail: 0,
            };
            let mut rx = Consumer {
                core,
                cached_head: 0,
            };

            let producer = thread::spawn(move || {
                for i in 0..K {
                    loop {
                        match tx.try_push(i) {
                            Ok(()) => break,
                            Err(_) => loom::thread::yield_now(),
                        }
                    }
                }
            });

            let consumer = thread::spawn(move || {
                let mut received = Vec::new();
                while received.len() < K as usize {
                    match rx.try_pop() {
                        Some(v) => received.push(v),
                        None => loom::thread::yield_now(),
                    }
                }
                received
            });

            producer.join().unwrap();
            let received = consumer.join().unwrap();
            assert_eq!(received, vec![0, 1, 2]);
        });
    }

    /// Full-ring retry never loses or duplicates an element.
    #[test]
    fn loom_spsc_full_retry() {
        loom::model(|| {
            let core = std::sync::Arc::new(RingCore::<u64>::new(2, OverflowPolicy::Drop));

            let mut tx = Producer {
                core: std::sync::Arc::clone(&core),
                cached_tail: 0,
            };
            let mut rx = Consumer {
                core,
                cached_head: 0,
            };

            let producer = thread::spawn(move || {
                for i in 0..4u64 {
                    loop {
                        match tx.try_push(i) {
                            Ok(()) => break,
                            Err(_) => loom::thread::yield_now(),
                        }
                    }
                }
            });

            let consumer = thread::spawn(move || {
                let mut received = Vec::new();
                while received.len() < 4 {
                    match rx.try_pop() {
                        Some(v) => received.push(v),
                        None => loom::thread::yield_now(),
                    }
                }
                received
            });

            producer.join().unwrap();
            assert_eq!(consumer.join().unwrap(), vec![0, 1, 2, 3]);
        });
    }
}
