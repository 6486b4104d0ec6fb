//! Benchmarks for recording allocation traffic into the `alloc_log` event log.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use alloc_log::EventLog;
use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const BASE_ADDRESS: usize = 0x10_0000;
const EVENT_SIZE: usize = 16;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("log_compaction");

    let allocs_op = allocs.operation("record_disabled");
    group.bench_function("record_disabled", |b| {
        b.iter_custom(|iters| {
            let mut log = EventLog::with_tracing();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                log.malloc(black_box(BASE_ADDRESS), black_box(EVENT_SIZE));
                log.free(black_box(BASE_ADDRESS), black_box(EVENT_SIZE));
                black_box(i);
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("record_run");
    group.bench_function("record_run", |b| {
        b.iter_custom(|iters| {
            let mut log = EventLog::with_tracing();
            log.set_enabled(true);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                let offset = usize::try_from(i).unwrap().wrapping_mul(EVENT_SIZE);
                log.allocate(black_box(BASE_ADDRESS.wrapping_add(offset)), EVENT_SIZE);
            }

            log.flush(true);

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("record_fused_pairs");
    group.bench_function("record_fused_pairs", |b| {
        b.iter_custom(|iters| {
            let mut log = EventLog::with_tracing();
            log.set_enabled(true);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                let offset = usize::try_from(i).unwrap().wrapping_mul(EVENT_SIZE);
                let address = black_box(BASE_ADDRESS.wrapping_add(offset));

                log.malloc(address, EVENT_SIZE);
                log.allocate(address, EVENT_SIZE);
                log.deallocate(address, EVENT_SIZE);
                log.free(address, EVENT_SIZE);
            }

            log.flush(true);

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
