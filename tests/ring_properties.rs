//! Property tests for the SPSC ring against a `VecDeque` reference model.

use std::collections::VecDeque;

use proptest::prelude::*;

use ringpipe::ring::{channel, OverflowPolicy};

const PROPTEST_CASES: u32 = 64;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Pop,
    PushBulk(Vec<u32>),
    PopBulk(u8),
    Peek,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u32>().prop_map(Op::Push),
        Just(Op::Pop),
        prop::collection::vec(any::<u32>(), 0..12).prop_map(Op::PushBulk),
        any::<u8>().prop_map(Op::PopBulk),
        Just(Op::Peek),
        Just(Op::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    /// Every interleaving of single and bulk operations matches the model,
    /// and cursor-derived sizes stay inside [0, capacity].
    #[test]
    fn ops_match_vecdeque_model(ops in prop::collection::vec(op_strategy(), 1..300)) {
        const CAPACITY: usize = 8;
        let (mut tx, mut rx) = channel::<u32>(CAPACITY, OverflowPolicy::Drop);
        let mut model: VecDeque<u32> = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(v) => {
                    let fits = model.len() < CAPACITY;
                    let result = tx.try_push(v);
                    prop_assert_eq!(result.is_ok(), fits);
                    if fits {
                        model.push_back(v);
                    } else {
                        prop_assert_eq!(result, Err(v));
                    }
                }
                Op::Pop => {
                    prop_assert_eq!(rx.try_pop(), model.pop_front());
                }
                Op::PushBulk(batch) => {
                    let expect = batch.len().min(CAPACITY - model.len());
                    let pushed = tx.try_push_bulk(&batch);
                    prop_assert_eq!(pushed, expect);
                    model.extend(&batch[..pushed]);
                }
                Op::PopBulk(limit) => {
                    let limit = (limit % 12) as usize;
                    let mut out = vec![0u32; limit];
                    let expect = limit.min(model.len());
                    let popped = rx.try_pop_bulk(&mut out);
                    prop_assert_eq!(popped, expect);
                    for slot in out.iter().take(popped) {
                        prop_assert_eq!(Some(*slot), model.pop_front());
                    }
                }
                Op::Peek => {
                    prop_assert_eq!(rx.try_peek().copied(), model.front().copied());
                }
                Op::Clear => {
                    rx.clear();
                    model.clear();
                }
            }

            prop_assert_eq!(tx.len(), model.len());
            prop_assert_eq!(rx.len(), model.len());
            prop_assert_eq!(tx.is_empty(), model.is_empty());
            prop_assert_eq!(tx.is_full(), model.len() == CAPACITY);
            prop_assert_eq!(tx.available(), CAPACITY - model.len());
        }
    }

    /// Bulk equivalence: a fully-fitting bulk push followed by an
    /// equal-length bulk pop returns the input verbatim.
    #[test]
    fn bulk_round_trip_is_identity(data in prop::collection::vec(any::<u32>(), 0..16)) {
        let (mut tx, mut rx) = channel::<u32>(16, OverflowPolicy::Drop);
        prop_assert_eq!(tx.try_push_bulk(&data), data.len());

        let mut out = vec![0u32; data.len()];
        prop_assert_eq!(rx.try_pop_bulk(&mut out), data.len());
        prop_assert_eq!(out, data);
    }

    /// Wrap correctness: from any cursor offset, a bulk push/pop longer than
    /// the distance to the boundary preserves element identity.
    #[test]
    fn wrapped_bulk_preserves_identity(
        offset in 1usize..8,
        data in prop::collection::vec(any::<u32>(), 1..8),
    ) {
        const CAPACITY: usize = 8;
        let (mut tx, mut rx) = channel::<u32>(CAPACITY, OverflowPolicy::Drop);

        // Advance both cursors to `offset` so longer batches wrap.
        let pad = vec![0u32; offset];
        prop_assert_eq!(tx.try_push_bulk(&pad), offset);
        let mut sink = vec![0u32; offset];
        prop_assert_eq!(rx.try_pop_bulk(&mut sink), offset);

        prop_assert_eq!(tx.try_push_bulk(&data), data.len());
        let mut out = vec![0u32; data.len()];
        prop_assert_eq!(rx.try_pop_bulk(&mut out), data.len());
        prop_assert_eq!(out, data);
    }

    /// View commit semantics: writing `n` and committing `n` advances the
    /// ring by exactly `n`; abandoning a view advances nothing.
    #[test]
    fn write_view_commit_and_abandon(
        reserve in 1usize..9,
        written in 0usize..9,
        abandon: bool,
    ) {
        let (mut tx, rx) = channel::<u32>(8, OverflowPolicy::Drop);
        let written = written.min(reserve);

        {
            let mut view = tx.write_view(reserve);
            let n = view.capacity().min(written);
            for i in 0..n {
                view[i] = i as u32;
            }
            if !abandon {
                view.commit(n).unwrap();
            }
        }

        if abandon {
            prop_assert_eq!(tx.len(), 0);
            prop_assert_eq!(rx.len(), 0);
        } else {
            prop_assert_eq!(tx.len(), written.min(8));
        }
    }

    /// FIFO order for any sequence of successful pushes and matching pops.
    #[test]
    fn fifo_order_holds(values in prop::collection::vec(any::<u32>(), 1..64)) {
        let (mut tx, mut rx) = channel::<u32>(64, OverflowPolicy::Drop);
        for &v in &values {
            prop_assert!(tx.try_push(v).is_ok());
        }
        for &v in &values {
            prop_assert_eq!(rx.try_pop(), Some(v));
        }
    }
}
