// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use loudness_core::BlockLoudnessEngine;

fn bench_push_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_engine_push_frame");

    for &sample_rate in &[44_100u32, 48_000, 96_000] {
        let mut engine = BlockLoudnessEngine::new(sample_rate);
        let frame = [0.2f64, -0.15];

        group.bench_with_input(BenchmarkId::from_parameter(sample_rate), &sample_rate, |b, _| {
            b.iter(|| {
                black_box(engine.push_frame(black_box(frame)));
            });
        });
    }

    group.finish();
}

fn bench_one_second_of_audio(c: &mut Criterion) {
    c.bench_function("block_engine_one_second_at_48k", |b| {
        b.iter(|| {
            let mut engine = BlockLoudnessEngine::new(48_000);
            for i in 0..48_000u32 {
                let t = i as f64 / 48_000.0;
                let s = (2.0 * std::f64::consts::PI * 1000.0 * t).sin() * 0.2;
                black_box(engine.push_frame(black_box([s, s])));
            }
        });
    });
}

criterion_group!(benches, bench_push_frame, bench_one_second_of_audio);
criterion_main!(benches);
