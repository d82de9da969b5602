use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use spectrum_fsm::{
    capture::BlockAccumulator,
    display::{SpectrumView, MAX_DISPLAY_FREQ_HZ},
    f_engine::SpectrumEngine,
    SampleBlock, ADC_MAX, BLOCK_SIZE, SAMPLE_RATE_HZ,
};

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let mut dummy_samples = [0u16; BLOCK_SIZE];
    for s in dummy_samples.iter_mut() {
        *s = rng.gen_range(0..=ADC_MAX);
    }
    let block = SampleBlock::from_array(0, dummy_samples);

    // Containers
    let engine = SpectrumEngine::new(SAMPLE_RATE_HZ);
    let spectrum = engine.compute(&block);
    let mut acc = BlockAccumulator::new();

    c.bench_function("spectrum compute", |b| {
        b.iter(|| engine.compute(black_box(&block)))
    });

    c.bench_function("spectrum view", |b| {
        b.iter(|| SpectrumView::new(black_box(&spectrum), black_box(MAX_DISPLAY_FREQ_HZ)))
    });

    c.bench_function("accumulate block", |b| {
        b.iter(|| {
            for &s in dummy_samples.iter() {
                if let Some(sealed) = acc.push(black_box(s)) {
                    black_box(sealed);
                }
            }
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
