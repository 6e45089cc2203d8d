use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cycle_gc::{Gc, Heap, trace_fields};

struct Node {
    value: u64,
    next: Gc<Node>,
}

trace_fields!(Node { next });

fn new_node(heap: &Heap, value: u64) -> Gc<Node> {
    heap.make(|heap| Node {
        value,
        next: heap.null(),
    })
}

/// A ring of `len` nodes reachable through the returned root.
fn build_ring(heap: &Heap, len: usize) -> Gc<Node> {
    let head = new_node(heap, 0);
    let tail = heap.null::<Node>();
    tail.set(&head);
    for i in 1..len {
        let next = new_node(heap, i as u64);
        tail.next.set(&next);
        tail.set(&next);
    }
    tail.next.set(&head);
    head
}

fn benchmark_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Allocation");

    group.bench_function("alloc_1000_values", |b| {
        b.iter(|| {
            let heap = Heap::new();
            for i in 0..1000u64 {
                black_box(heap.alloc(i));
            }
            black_box(heap.tracked_count())
        });
    });

    group.bench_function("make_1000_nodes", |b| {
        b.iter(|| {
            let heap = Heap::new();
            for i in 0..1000u64 {
                black_box(new_node(&heap, i));
            }
            black_box(heap.tracked_count())
        });
    });

    group.finish();
}

fn benchmark_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Collection");

    group.bench_function("collect_live_ring_10000", |b| {
        let heap = Heap::new();
        let root = build_ring(&heap, 10_000);
        b.iter(|| black_box(heap.collect()));
        black_box(root.value);
    });

    group.bench_function("collect_dead_ring_10000", |b| {
        b.iter_with_setup(
            || {
                let heap = Heap::new();
                drop(build_ring(&heap, 10_000));
                heap
            },
            |heap| black_box(heap.collect()),
        );
    });

    group.bench_function("collect_mixed_1000_rings", |b| {
        b.iter_with_setup(
            || {
                let heap = Heap::new();
                let live: Vec<_> = (0..1000)
                    .map(|i| {
                        let ring = build_ring(&heap, 4);
                        if i % 2 == 0 { Some(ring) } else { None }
                    })
                    .collect();
                (heap, live)
            },
            |(heap, live)| {
                black_box(heap.collect());
                live
            },
        );
    });

    group.finish();
}

criterion_group!(benches, benchmark_allocation, benchmark_collection);
criterion_main!(benches);
