//! Replays the sequence and map workloads on every allocation strategy with detailed logging
//! enabled, then prints the heap statistics of each run.
//!
//! Every compacted log entry is emitted as a `tracing` event at INFO level. Arena growth shows up
//! at DEBUG and TRACE level.

use std::mem::MaybeUninit;

use alloc_log::{EventLog, Logger};
use layered_alloc::workloads::{
    MAP_KEY_RANGE, NODE_SIZE_CLASS, VECTOR_ELEMENTS, map_churn, typed_map_churn,
    typed_vector_fill, vector_fill,
};
use layered_alloc::{
    ArenaAllocator, ByteAllocator, HeapAllocator, PassThrough, ReuseAllocator, SharedAllocator,
    StackBuffer,
};

fn main() -> layered_alloc::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let logger = Logger::new(EventLog::with_tracing());

    begin_run("heap", &logger);
    replay(&mut HeapAllocator::with_logger(logger.clone()))?;
    end_run(&logger);

    begin_run("arena", &logger);
    {
        let mut arena = ArenaAllocator::builder()
            .logger(logger.clone())
            .backing(HeapAllocator::with_logger(logger.clone()))
            .build()?;

        replay(&mut arena)?;
    }
    end_run(&logger);

    begin_run("reuse on arena", &logger);
    {
        let arena = ArenaAllocator::builder()
            .logger(logger.clone())
            .backing(HeapAllocator::with_logger(logger.clone()))
            .build()?;

        let mut reuse = ReuseAllocator::builder()
            .size_class(NODE_SIZE_CLASS)
            .logger(logger.clone())
            .backing(arena)
            .build();

        replay(&mut reuse)?;
    }
    end_run(&logger);

    begin_run("stack buffer", &logger);
    {
        let mut storage = [MaybeUninit::<u8>::uninit(); 1024];
        let mut stack = StackBuffer::new(&mut storage, HeapAllocator::with_logger(logger.clone()));

        replay(&mut stack)?;
        println!("stack buffer used {} of {} bytes", stack.used(), stack.capacity());
    }
    end_run(&logger);

    begin_run("typed containers on arena", &logger);
    {
        let arena = ArenaAllocator::builder()
            .logger(logger.clone())
            .backing(HeapAllocator::with_logger(logger.clone()))
            .build()?;

        let mut shared = SharedAllocator::new(arena);

        let vector = typed_vector_fill(&shared, VECTOR_ELEMENTS);
        let map = typed_map_churn(&mut shared, MAP_KEY_RANGE);

        println!("checksums: vector {vector}, map {map}");
    }
    end_run(&logger);

    begin_run("pass-through", &logger);
    replay(&mut PassThrough::with_logger(
        HeapAllocator::with_logger(logger.clone()),
        logger.clone(),
    ))?;
    end_run(&logger);

    Ok(())
}

fn replay(allocator: &mut impl ByteAllocator) -> layered_alloc::Result<()> {
    let vector = vector_fill(allocator, VECTOR_ELEMENTS)?;
    let map = map_churn(allocator, MAP_KEY_RANGE)?;

    println!("checksums: vector {vector}, map {map}");

    Ok(())
}

fn begin_run(name: &str, logger: &Logger) {
    println!();
    println!("=== {name} ===");

    logger.reset();
    logger.set_enabled(true);
}

fn end_run(logger: &Logger) {
    logger.flush(true);
    logger.set_enabled(false);
    logger.log_meta_stats();

    println!("{}", logger.meta_stats());
}
