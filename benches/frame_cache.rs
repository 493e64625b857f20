//! Benchmarks for the frame cache hot path
//!
//! The decoder pushes and the pacer pops under one mutex; both must stay far
//! below a frame period even when the cache is full and evicting.
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use ndiplay::FrameCache;
use ndiplay::test_utils::{software_profile, video_frame};
use std::hint::black_box;

fn bench_push(c: &mut Criterion) {
    let profile = software_profile();
    let mut group = c.benchmark_group("frame_cache_push");

    group.bench_function("push_into_empty", |b| {
        b.iter_batched(
            || (FrameCache::new(&profile), video_frame(1, 0, 64, 36)),
            |(cache, frame)| black_box(cache.push(frame)),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("push_with_eviction", |b| {
        let cache = FrameCache::new(&profile);
        let mut sequence = 0u64;
        for _ in 0..cache.capacity() {
            sequence += 1;
            let _ = cache.push(video_frame(sequence, sequence * 33, 64, 36));
        }
        b.iter_batched(
            || {
                sequence += 1;
                video_frame(sequence, sequence * 33, 64, 36)
            },
            |frame| black_box(cache.push(frame)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_pop_latest(c: &mut Criterion) {
    let profile = software_profile();
    let mut group = c.benchmark_group("frame_cache_pop");

    group.bench_function("pop_latest_full", |b| {
        b.iter_batched(
            || {
                let cache = FrameCache::new(&profile);
                for sequence in 0..cache.capacity() as u64 {
                    let _ = cache.push(video_frame(sequence, sequence * 33, 64, 36));
                }
                cache
            },
            |cache| black_box(cache.pop_latest()),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("pop_latest_empty", |b| {
        let cache = FrameCache::new(&profile);
        b.iter(|| black_box(cache.pop_latest()))
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_pop_latest);
criterion_main!(benches);
