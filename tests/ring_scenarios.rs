//! Scenario tests for the SPSC ring: overflow policy laws, wrap-around view
//! shapes, and cross-thread draining.

use ringpipe::ring::{channel, OverflowPolicy};

/// Capacity-4 drop ring: pushes 0..=3 land, the fifth is rejected, and pops
/// return the survivors in order.
#[test]
fn drop_ring_rejects_fifth_push() {
    let (mut tx, mut rx) = channel::<u32>(4, OverflowPolicy::Drop);

    for v in 0..4 {
        assert!(tx.try_push(v).is_ok(), "push {v} should fit");
    }
    assert_eq!(tx.try_push(4), Err(4));
    assert_eq!(tx.len(), 4);

    for v in 0..4 {
        assert_eq!(rx.try_pop(), Some(v));
    }
    assert_eq!(rx.try_pop(), None);
}

/// Capacity-4 overwrite ring: six pushes all succeed; the two oldest values
/// are gone and the newest four remain.
#[test]
fn overwrite_ring_keeps_newest_four() {
    let (mut tx, mut rx) = channel::<u32>(4, OverflowPolicy::Overwrite);

    for v in 0..6 {
        assert!(tx.try_push(v).is_ok(), "push {v} always succeeds");
    }
    assert_eq!(tx.len(), 4);

    for v in 2..6 {
        assert_eq!(rx.try_pop(), Some(v));
    }
    assert_eq!(rx.try_pop(), None);
}

/// Policy law: a full drop ring keeps `len == capacity` across failed pushes.
#[test]
fn drop_ring_size_is_stable_when_full() {
    let (mut tx, _rx) = channel::<u32>(4, OverflowPolicy::Drop);
    for v in 0..4 {
        tx.try_push(v).unwrap();
    }
    for v in 100..110 {
        assert!(tx.try_push(v).is_err());
        assert_eq!(tx.len(), 4);
    }
}

/// Policy law: a full overwrite ring keeps `len == capacity` across
/// succeeding pushes.
#[test]
fn overwrite_ring_size_is_stable_when_full() {
    let (mut tx, _rx) = channel::<u32>(4, OverflowPolicy::Overwrite);
    for v in 0..20 {
        tx.try_push(v).unwrap();
        assert!(tx.len() <= 4);
    }
    assert_eq!(tx.len(), 4);
}

/// Capacity-16 block ring: a 50-element bulk stream lands in order while a
/// second thread drains concurrently.
#[test]
fn block_ring_bulk_stream_with_concurrent_drain() {
    let (mut tx, mut rx) = channel::<u32>(16, OverflowPolicy::Block);
    let data: Vec<u32> = (1..=50).collect();

    let producer = std::thread::spawn(move || {
        let mut sent = 0;
        while sent < data.len() {
            // Bulk push is best-effort; single-element pushes block.
            let n = tx.try_push_bulk(&data[sent..]);
            sent += n;
            if n == 0 {
                std::thread::yield_now();
            }
        }
    });

    let consumer = std::thread::spawn(move || {
        let mut got = Vec::new();
        while got.len() < 50 {
            match rx.try_pop() {
                Some(v) => got.push(v),
                None => std::thread::yield_now(),
            }
        }
        got
    });

    producer.join().unwrap();
    let got = consumer.join().unwrap();
    assert_eq!(got, (1..=50).collect::<Vec<u32>>());
}

/// Capacity-8 ring with both cursors advanced to 6: a 5-slot non-contiguous
/// write view splits 2 + 3, and committing 5 makes the exact bytes pop.
#[test]
fn non_contiguous_write_view_round_trip() {
    let (mut tx, mut rx) = channel::<u32>(8, OverflowPolicy::Drop);

    // Walk the cursors so head & mask == 6.
    for v in 0..6 {
        tx.try_push(v).unwrap();
    }
    for _ in 0..6 {
        rx.try_pop().unwrap();
    }

    let mut view = tx.write_segments(5);
    assert_eq!(view.segment_count(), 2);
    {
        let (first, second) = view.as_mut_slices();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
    }
    assert_eq!(view.write(&[100, 101, 102, 103, 104]), 5);
    view.commit(5).unwrap();

    for expected in [100, 101, 102, 103, 104] {
        assert_eq!(rx.try_pop(), Some(expected));
    }
    assert_eq!(rx.try_pop(), None);
}

/// Block-policy single pushes busy-wait rather than failing: total ordering
/// survives a slow consumer.
#[test]
fn block_ring_single_pushes_never_drop() {
    let (mut tx, mut rx) = channel::<u64>(4, OverflowPolicy::Block);
    const TOTAL: u64 = 5_000;

    let producer = std::thread::spawn(move || {
        for v in 0..TOTAL {
            tx.try_push(v).unwrap();
        }
    });

    let consumer = std::thread::spawn(move || {
        let mut next = 0u64;
        while next < TOTAL {
            if let Some(v) = rx.try_pop() {
                assert_eq!(v, next);
                next += 1;
            } else {
                std::thread::yield_now();
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
