use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ringpipe::ring::{channel, OverflowPolicy};

const OPS_PER_ITER: u64 = 10_000;

/// Single-element push/pop cycle on one thread: the uncontended hot path.
fn bench_push_pop_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("push_pop_cycle_cap64", |b| {
        let (mut tx, mut rx) = channel::<u64>(64, OverflowPolicy::Drop);
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                if tx.is_full() {
                    black_box(rx.try_pop());
                }
                let _ = tx.try_push(black_box(i));
            }
            rx.clear();
        })
    });

    group.bench_function("push_pop_cycle_cap1024", |b| {
        let (mut tx, mut rx) = channel::<u64>(1024, OverflowPolicy::Drop);
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                if tx.is_full() {
                    black_box(rx.try_pop());
                }
                let _ = tx.try_push(black_box(i));
            }
            rx.clear();
        })
    });

    group.finish();
}

/// Bulk fill-then-drain against the element-at-a-time equivalent.
fn bench_bulk_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring_bulk");

    for batch in [64usize, 1024, 16 * 1024] {
        group.throughput(Throughput::Bytes(batch as u64));

        group.bench_function(format!("bulk_round_trip_{batch}"), |b| {
            let (mut tx, mut rx) = channel::<u8>(16 * 1024, OverflowPolicy::Drop);
            let data = vec![0xA5u8; batch];
            let mut out = vec![0u8; batch];
            b.iter(|| {
                let pushed = tx.try_push_bulk(black_box(&data));
                let popped = rx.try_pop_bulk(black_box(&mut out));
                assert_eq!(pushed, popped);
            })
        });

        group.bench_function(format!("single_round_trip_{batch}"), |b| {
            let (mut tx, mut rx) = channel::<u8>(16 * 1024, OverflowPolicy::Drop);
            b.iter(|| {
                for i in 0..batch {
                    let _ = tx.try_push(black_box(i as u8));
                }
                for _ in 0..batch {
                    black_box(rx.try_pop());
                }
            })
        });
    }

    group.finish();
}

/// Zero-copy drain through read views versus bulk pop.
fn bench_view_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring_views");
    const FILL: usize = 8 * 1024;
    group.throughput(Throughput::Bytes(FILL as u64));

    group.bench_function("read_views_drain", |b| {
        let (mut tx, mut rx) = channel::<u8>(FILL, OverflowPolicy::Drop);
        let data = vec![0x5Au8; FILL];
        b.iter(|| {
            tx.try_push_bulk(&data);
            let mut seen = 0usize;
            for segment in rx.read_views(usize::MAX).as_slice() {
                seen += black_box(segment).len();
            }
            rx.advance_read(seen).unwrap();
        })
    });

    group.bench_function("pop_bulk_drain", |b| {
        let (mut tx, mut rx) = channel::<u8>(FILL, OverflowPolicy::Drop);
        let data = vec![0x5Au8; FILL];
        let mut out = vec![0u8; FILL];
        b.iter(|| {
            tx.try_push_bulk(&data);
            black_box(rx.try_pop_bulk(&mut out));
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_push_pop_cycle,
    bench_bulk_transfer,
    bench_view_drain
);
criterion_main!(benches);
